//! Virtual file table
//!
//! One row per virtual file:
//!
//! ```text
//! ┌──────────┬──────────┬─────────┬─────────────────┬──────────┐
//! │ name_    │ value_   │ size_   │ lf_             │ deleted_ │
//! │ varchar  │ blob     │ integer │ epoch millis    │ bit      │
//! │ (pk)     │ nullable │ >= 0    │                 │          │
//! └──────────┴──────────┴─────────┴─────────────────┴──────────┘
//! ```
//!
//! [`FileTable`] precomputes every statement from the dialect and the
//! configured column names, and exposes the row-level operations the
//! handlers, readers, writers and locks are built on.

mod template;

pub use template::SqlTemplate;

use crate::context::TxContext;
use crate::dialect::Dialect;
use crate::error::{DirectoryError, Result};
use crate::settings::{ColumnNames, DirectorySettings};
use rusqlite::blob::{Blob, ZeroBlob};
use rusqlite::{params, DatabaseName};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SAVEPOINT: &str = "sqldir_save";

/// Statement text, built once per table
#[derive(Debug)]
struct TableSql {
    create: String,
    drop: String,
    table_exists: Option<String>,
    select_names: String,
    select_name_exists: String,
    select_size_by_name: String,
    select_size_value_by_name: String,
    select_range_by_name: String,
    select_locator_by_name: Option<String>,
    select_last_modified_by_name: String,
    update_last_modified_by_name: String,
    insert: String,
    update_content_by_name: String,
    update_name_by_name: String,
    delete_by_name: String,
    mark_delete_by_name: String,
    delete_all: String,
    delete_mark_deleted_before: String,
    select_name_for_update_nowait: String,
    current_timestamp: String,
    savepoint: String,
    release_savepoint: String,
    rollback_to_savepoint: String,
}

impl TableSql {
    fn build(dialect: &dyn Dialect, table: &str, cols: &ColumnNames, settings: &DirectorySettings) -> Self {
        let ColumnNames {
            name,
            value,
            size,
            last_modified: lf,
            deleted,
        } = cols;
        let now = dialect.current_timestamp_function();

        let create = format!(
            "create table {table} ({name} {} not null, {value} {}, {size} {}, {lf} {}, {deleted} {}, primary key ({name}))",
            dialect.varchar_type(settings.name_column_length),
            dialect.blob_type(settings.value_column_length_k),
            dialect.number_type(),
            dialect.timestamp_type(),
            dialect.bit_type(),
        );

        let drop = if dialect.supports_if_exists_before_table_name() {
            format!("drop table if exists {table}{}", dialect.cascade_constraints_string())
        } else if dialect.supports_if_exists_after_table_name() {
            format!("drop table {table} if exists{}", dialect.cascade_constraints_string())
        } else {
            format!("drop table {table}{}", dialect.cascade_constraints_string())
        };

        TableSql {
            create,
            drop,
            table_exists: dialect.sql_table_exists(),
            select_names: format!("select {name} from {table} where {deleted} = ?1"),
            select_name_exists: format!("select {deleted} from {table} where {name} = ?1"),
            select_size_by_name: format!("select {size} from {table} where {name} = ?1"),
            select_size_value_by_name: format!(
                "select {name}, {value}, {size} from {table} where {name} = ?1"
            ),
            select_range_by_name: format!(
                "select {size}, {} from {table} where {name} = ?1",
                dialect.ranged_read_function(value, "?2", "?3")
            ),
            select_locator_by_name: dialect.row_locator_column().map(|locator| {
                format!("select {locator}, {size} from {table} where {name} = ?1")
            }),
            select_last_modified_by_name: format!("select {lf} from {table} where {name} = ?1"),
            update_last_modified_by_name: format!("update {table} set {lf} = {now} where {name} = ?1"),
            insert: format!(
                "insert into {table} ({name}, {value}, {size}, {lf}, {deleted}) values (?1, ?2, ?3, {now}, ?4)"
            ),
            update_content_by_name: format!(
                "update {table} set {value} = ?1, {size} = ?2, {lf} = {now}, {deleted} = ?3 where {name} = ?4"
            ),
            update_name_by_name: format!("update {table} set {name} = ?1 where {name} = ?2"),
            delete_by_name: format!("delete from {table} where {name} = ?1"),
            mark_delete_by_name: format!(
                "update {table} set {deleted} = ?1, {lf} = {now} where {name} = ?2"
            ),
            delete_all: format!("delete from {table}"),
            delete_mark_deleted_before: format!(
                "delete from {table} where {deleted} = ?1 and {lf} < ?2"
            ),
            select_name_for_update_nowait: format!(
                "select {name} from {table} where {name} = ?1{}",
                dialect.for_update_nowait_string()
            ),
            current_timestamp: dialect.current_timestamp_select(),
            savepoint: dialect.savepoint(SAVEPOINT),
            release_savepoint: dialect.release_savepoint(SAVEPOINT),
            rollback_to_savepoint: dialect.rollback_to_savepoint(SAVEPOINT),
        }
    }
}

struct TableDef {
    name: String,
    dialect: Arc<dyn Dialect>,
    columns: ColumnNames,
    name_column_length: usize,
    sql: TableSql,
}

/// Handle on the virtual file table
///
/// Cheap to clone; clones share the statement text. Each clone carries its own
/// query timeout so per-pattern settings can use different ones.
#[derive(Clone)]
pub struct FileTable {
    def: Arc<TableDef>,
    template: SqlTemplate,
}

impl FileTable {
    pub fn new(name: impl Into<String>, dialect: Arc<dyn Dialect>, settings: &DirectorySettings) -> Self {
        let name = name.into();
        let sql = TableSql::build(dialect.as_ref(), &name, &settings.columns, settings);
        FileTable {
            def: Arc::new(TableDef {
                name,
                dialect,
                columns: settings.columns.clone(),
                name_column_length: settings.name_column_length,
                sql,
            }),
            template: SqlTemplate::new(settings.query_timeout()),
        }
    }

    /// Same table, different query timeout
    pub fn with_query_timeout(&self, timeout: Duration) -> Self {
        FileTable {
            def: Arc::clone(&self.def),
            template: SqlTemplate::new(timeout),
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.def.dialect.as_ref()
    }

    pub fn columns(&self) -> &ColumnNames {
        &self.def.columns
    }

    pub fn template(&self) -> &SqlTemplate {
        &self.template
    }

    fn sql(&self) -> &TableSql {
        &self.def.sql
    }

    /// Reject names longer than the name column
    pub fn check_name(&self, name: &str) -> Result<()> {
        let max = self.def.name_column_length;
        if name.chars().count() > max {
            return Err(DirectoryError::NameTooLong {
                name: name.to_string(),
                max,
            });
        }
        Ok(())
    }

    // Table lifecycle

    pub fn create_table(&self, ctx: &TxContext<'_>) -> Result<()> {
        self.template.execute_batch(ctx, &self.sql().create)
    }

    pub fn drop_table(&self, ctx: &TxContext<'_>) -> Result<()> {
        self.template.execute_batch(ctx, &self.sql().drop)
    }

    /// Whether the table exists. Errors when the dialect cannot tell.
    pub fn table_exists(&self, ctx: &TxContext<'_>) -> Result<bool> {
        let sql = self.sql().table_exists.as_deref().ok_or_else(|| {
            DirectoryError::Configuration(format!(
                "dialect [{}] cannot check whether a table exists",
                self.dialect().name()
            ))
        })?;
        let found = self.template.query_optional(
            ctx,
            sql,
            [self.name().to_lowercase()],
            |_| Ok(()),
        )?;
        Ok(found.is_some())
    }

    // Reads

    /// Names of all files that are not marked deleted
    pub fn list_names(&self, ctx: &TxContext<'_>) -> Result<Vec<String>> {
        self.template
            .query_all(ctx, &self.sql().select_names, [false], |row| row.get(0))
    }

    /// A row exists for `name` and is not marked deleted
    pub fn exists(&self, ctx: &TxContext<'_>, name: &str) -> Result<bool> {
        let deleted: Option<Option<bool>> = self.template.query_optional(
            ctx,
            &self.sql().select_name_exists,
            [name],
            |row| row.get(0),
        )?;
        Ok(matches!(deleted, Some(Some(false)) | Some(None)))
    }

    /// Recorded length, `None` when no row exists
    pub fn size(&self, ctx: &TxContext<'_>, name: &str) -> Result<Option<u64>> {
        let size: Option<Option<i64>> = self.template.query_optional(
            ctx,
            &self.sql().select_size_by_name,
            [name],
            |row| row.get(0),
        )?;
        Ok(size.map(|size| size.unwrap_or(0).max(0) as u64))
    }

    /// Recorded length, 0 when no row exists
    pub fn length(&self, ctx: &TxContext<'_>, name: &str) -> Result<u64> {
        Ok(self.size(ctx, name)?.unwrap_or(0))
    }

    /// Last modification in epoch millis, 0 when no row exists
    pub fn last_modified(&self, ctx: &TxContext<'_>, name: &str) -> Result<i64> {
        let lf: Option<Option<i64>> = self.template.query_optional(
            ctx,
            &self.sql().select_last_modified_by_name,
            [name],
            |row| row.get(0),
        )?;
        Ok(lf.flatten().unwrap_or(0))
    }

    /// Whole content and recorded length
    pub fn fetch(&self, ctx: &TxContext<'_>, name: &str) -> Result<Option<(u64, Vec<u8>)>> {
        self.template.query_optional(
            ctx,
            &self.sql().select_size_value_by_name,
            [name],
            |row| {
                let content: Option<Vec<u8>> = row.get(1)?;
                let size: i64 = row.get(2)?;
                Ok((size.max(0) as u64, content.unwrap_or_default()))
            },
        )
    }

    /// Recorded length and `length` bytes starting at 1-based `position`
    pub fn fetch_range(
        &self,
        ctx: &TxContext<'_>,
        name: &str,
        position: u64,
        length: usize,
    ) -> Result<Option<(u64, Vec<u8>)>> {
        self.template.query_optional(
            ctx,
            &self.sql().select_range_by_name,
            params![name, position as i64, length as i64],
            |row| {
                let size: i64 = row.get(0)?;
                let bytes: Option<Vec<u8>> = row.get(1)?;
                Ok((size.max(0) as u64, bytes.unwrap_or_default()))
            },
        )
    }

    /// Row locator and recorded length, for incremental blob I/O
    pub fn locate(&self, ctx: &TxContext<'_>, name: &str) -> Result<Option<(i64, u64)>> {
        let sql = self.locator_sql()?;
        self.template.query_optional(ctx, sql, [name], |row| {
            let locator: i64 = row.get(0)?;
            let size: i64 = row.get(1)?;
            Ok((locator, size.max(0) as u64))
        })
    }

    fn locator_sql(&self) -> Result<&str> {
        self.sql().select_locator_by_name.as_deref().ok_or_else(|| {
            DirectoryError::Configuration(format!(
                "dialect [{}] has no row locator for blob handles",
                self.dialect().name()
            ))
        })
    }

    /// Open a read-only handle on the content of the row at `locator`
    pub fn open_blob<'c>(&self, ctx: &TxContext<'c>, locator: i64) -> Result<Blob<'c>> {
        ctx.connection()
            .blob_open(DatabaseName::Main, self.name(), &self.columns().value, locator, true)
            .map_err(|e| DirectoryError::store(format!("open blob [{}#{}]", self.name(), locator), e))
    }

    /// Current time in epoch millis, from the database when the dialect can
    /// select it, else from the application clock
    pub fn current_time_millis(&self, ctx: &TxContext<'_>) -> Result<i64> {
        if self.dialect().supports_current_timestamp_selection() {
            let now: Option<i64> =
                self.template
                    .query_optional(ctx, &self.sql().current_timestamp, [], |row| row.get(0))?;
            if let Some(now) = now {
                return Ok(now);
            }
        }
        Ok(chrono::Utc::now().timestamp_millis())
    }

    // Writes

    /// Insert or replace the content of `name` in one logical write
    pub fn save_bytes(&self, ctx: &TxContext<'_>, name: &str, content: &[u8]) -> Result<()> {
        self.check_name(name)?;
        ctx.blob_cache().release(self.name(), name);
        debug!("Saving {} bytes to {}/{}", content.len(), self.name(), name);
        self.within_savepoint(ctx, || self.upsert(ctx, name, content, content.len() as u64))
    }

    /// Insert or replace the content of `name` with `length` bytes streamed
    /// from `reader`
    pub fn save_stream<R: Read>(
        &self,
        ctx: &TxContext<'_>,
        name: &str,
        length: u64,
        reader: &mut R,
    ) -> Result<()> {
        self.check_name(name)?;
        let Some(locator_sql) = self.sql().select_locator_by_name.as_deref() else {
            let mut content = Vec::with_capacity(length as usize);
            reader.take(length).read_to_end(&mut content)?;
            return self.save_bytes(ctx, name, &content);
        };

        let placeholder_len = i32::try_from(length).map_err(|_| {
            DirectoryError::Configuration(format!("{name}: {length} bytes exceeds the blob size limit"))
        })?;

        ctx.blob_cache().release(self.name(), name);
        debug!("Streaming {} bytes to {}/{}", length, self.name(), name);
        self.within_savepoint(ctx, || {
            self.upsert(ctx, name, ZeroBlob(placeholder_len), length)?;
            let locator: i64 = self
                .template
                .query_optional(ctx, locator_sql, [name], |row| row.get(0))?
                .ok_or_else(|| DirectoryError::FileNotFound(name.to_string()))?;
            let mut blob = ctx
                .connection()
                .blob_open(DatabaseName::Main, self.name(), &self.columns().value, locator, false)
                .map_err(|e| {
                    DirectoryError::store(format!("open blob [{}#{}]", self.name(), locator), e)
                })?;
            let copied = io::copy(&mut reader.take(length), &mut blob)?;
            if copied != length {
                return Err(DirectoryError::CorruptionOrEof(format!(
                    "{name}: streamed {copied} of {length} bytes"
                )));
            }
            Ok(())
        })
    }

    fn upsert<V: rusqlite::ToSql>(&self, ctx: &TxContext<'_>, name: &str, value: V, length: u64) -> Result<()> {
        let length = length as i64;
        let updated = self.template.execute(
            ctx,
            &self.sql().update_content_by_name,
            params![&value, length, false, name],
        )?;
        if updated == 0 {
            self.template
                .execute(ctx, &self.sql().insert, params![name, &value, length, false])?;
        }
        Ok(())
    }

    fn within_savepoint<T>(&self, ctx: &TxContext<'_>, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.template.execute_batch(ctx, &self.sql().savepoint)?;
        match f() {
            Ok(value) => {
                self.template.execute_batch(ctx, &self.sql().release_savepoint)?;
                Ok(value)
            }
            Err(err) => {
                let undo = format!(
                    "{}; {}",
                    self.sql().rollback_to_savepoint,
                    self.sql().release_savepoint
                );
                if let Err(rollback_err) = self.template.execute_batch(ctx, &undo) {
                    warn!("Failed to roll back partial save: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Insert an empty row named `name`; fails on an existing row
    pub fn insert_empty(&self, ctx: &TxContext<'_>, name: &str) -> Result<()> {
        self.check_name(name)?;
        self.template.execute(
            ctx,
            &self.sql().insert,
            params![name, Option::<Vec<u8>>::None, 0i64, false],
        )?;
        Ok(())
    }

    pub fn touch(&self, ctx: &TxContext<'_>, name: &str) -> Result<()> {
        ctx.blob_cache().release(self.name(), name);
        self.template
            .execute(ctx, &self.sql().update_last_modified_by_name, [name])?;
        Ok(())
    }

    /// Point the row named `from` at `to`. Does not clear `to` first.
    pub fn update_name(&self, ctx: &TxContext<'_>, from: &str, to: &str) -> Result<usize> {
        self.check_name(to)?;
        ctx.blob_cache().release(self.name(), from);
        self.template
            .execute(ctx, &self.sql().update_name_by_name, [to, from])
    }

    /// Remove the row, returning how many were removed
    pub fn delete(&self, ctx: &TxContext<'_>, name: &str) -> Result<usize> {
        ctx.blob_cache().release(self.name(), name);
        self.template.execute(ctx, &self.sql().delete_by_name, [name])
    }

    /// Flag the row deleted and stamp the time it happened
    pub fn mark_delete(&self, ctx: &TxContext<'_>, name: &str) -> Result<usize> {
        ctx.blob_cache().release(self.name(), name);
        self.template
            .execute(ctx, &self.sql().mark_delete_by_name, params![true, name])
    }

    pub fn delete_all(&self, ctx: &TxContext<'_>) -> Result<usize> {
        ctx.blob_cache().release_all();
        self.template.execute(ctx, &self.sql().delete_all, [])
    }

    /// Purge rows marked deleted before `before` (epoch millis)
    pub fn delete_mark_deleted_before(&self, ctx: &TxContext<'_>, before: i64) -> Result<usize> {
        ctx.blob_cache().release_all();
        self.template.execute(
            ctx,
            &self.sql().delete_mark_deleted_before,
            params![true, before],
        )
    }

    /// Non-waiting row lock on `name`. `Ok(false)` when no row exists.
    pub fn select_for_update_nowait(&self, ctx: &TxContext<'_>, name: &str) -> Result<bool> {
        let found = self.template.query_optional(
            ctx,
            &self.sql().select_name_for_update_nowait,
            [name],
            |_| Ok(()),
        )?;
        Ok(found.is_some())
    }

    /// Whether a row exists at all, deleted or not
    pub fn row_exists(&self, ctx: &TxContext<'_>, name: &str) -> Result<bool> {
        let found =
            self.template
                .query_optional(ctx, &self.sql().select_size_by_name, [name], |_| Ok(()))?;
        Ok(found.is_some())
    }
}

impl fmt::Display for FileTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name(), self.dialect().name())
    }
}

impl fmt::Debug for FileTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTable")
            .field("name", &self.def.name)
            .field("dialect", &self.def.dialect.name())
            .field("query_timeout", &self.template.query_timeout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use rusqlite::Connection;

    fn table() -> FileTable {
        FileTable::new("files", Arc::new(SqliteDialect), &DirectorySettings::default())
    }

    #[test]
    fn test_save_inserts_then_updates() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        t.create_table(&ctx).unwrap();

        t.save_bytes(&ctx, "a", b"hello").unwrap();
        assert_eq!(t.length(&ctx, "a").unwrap(), 5);
        t.save_bytes(&ctx, "a", b"hi").unwrap();
        assert_eq!(t.length(&ctx, "a").unwrap(), 2);
        assert_eq!(t.fetch(&ctx, "a").unwrap(), Some((2, b"hi".to_vec())));
        assert_eq!(t.list_names(&ctx).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_save_stream_writes_exact_bytes() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        t.create_table(&ctx).unwrap();

        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        t.save_stream(&ctx, "big", data.len() as u64, &mut &data[..])
            .unwrap();
        assert_eq!(t.fetch(&ctx, "big").unwrap(), Some((5000, data)));
    }

    #[test]
    fn test_failed_stream_leaves_row_untouched() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        t.create_table(&ctx).unwrap();
        t.save_bytes(&ctx, "f", b"original").unwrap();

        // Reader shorter than the announced length
        let short = [1u8, 2, 3];
        let err = t.save_stream(&ctx, "f", 10, &mut &short[..]).unwrap_err();
        assert!(matches!(err, DirectoryError::CorruptionOrEof(_)));
        assert_eq!(t.fetch(&ctx, "f").unwrap(), Some((8, b"original".to_vec())));
    }

    #[test]
    fn test_ranged_fetch() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        t.create_table(&ctx).unwrap();
        t.save_bytes(&ctx, "r", &[10, 11, 12, 13, 14]).unwrap();

        assert_eq!(
            t.fetch_range(&ctx, "r", 2, 3).unwrap(),
            Some((5, vec![11, 12, 13]))
        );
        assert_eq!(t.fetch_range(&ctx, "missing", 1, 1).unwrap(), None);
    }

    #[test]
    fn test_mark_delete_hides_but_keeps_row() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        t.create_table(&ctx).unwrap();
        t.save_bytes(&ctx, "m", b"x").unwrap();

        assert_eq!(t.mark_delete(&ctx, "m").unwrap(), 1);
        assert!(!t.exists(&ctx, "m").unwrap());
        assert!(t.row_exists(&ctx, "m").unwrap());
        assert!(t.list_names(&ctx).unwrap().is_empty());

        // Rewriting a mark-deleted name revives it
        t.save_bytes(&ctx, "m", b"yz").unwrap();
        assert!(t.exists(&ctx, "m").unwrap());
    }

    #[test]
    fn test_missing_name_reads_as_empty() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        t.create_table(&ctx).unwrap();
        assert_eq!(t.length(&ctx, "nope").unwrap(), 0);
        assert_eq!(t.last_modified(&ctx, "nope").unwrap(), 0);
        assert!(!t.exists(&ctx, "nope").unwrap());
        assert_eq!(t.fetch(&ctx, "nope").unwrap(), None);
    }

    #[test]
    fn test_insert_empty_conflicts() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        t.create_table(&ctx).unwrap();
        t.insert_empty(&ctx, "write.lock").unwrap();
        assert!(t.exists(&ctx, "write.lock").unwrap());
        let err = t.insert_empty(&ctx, "write.lock").unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_name_length_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        t.create_table(&ctx).unwrap();
        let long = "x".repeat(51);
        let err = t.save_bytes(&ctx, &long, b"").unwrap_err();
        assert!(matches!(err, DirectoryError::NameTooLong { max: 50, .. }));
    }

    #[test]
    fn test_table_exists_and_drop() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        assert!(!t.table_exists(&ctx).unwrap());
        t.create_table(&ctx).unwrap();
        assert!(t.table_exists(&ctx).unwrap());
        t.drop_table(&ctx).unwrap();
        assert!(!t.table_exists(&ctx).unwrap());
        // if exists form tolerates a missing table
        t.drop_table(&ctx).unwrap();
    }

    #[test]
    fn test_sweep_respects_age() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = table();
        t.create_table(&ctx).unwrap();
        t.save_bytes(&ctx, "old", b"1").unwrap();
        t.mark_delete(&ctx, "old").unwrap();

        let now = t.current_time_millis(&ctx).unwrap();
        assert_eq!(t.delete_mark_deleted_before(&ctx, now - 60_000).unwrap(), 0);
        assert_eq!(t.delete_mark_deleted_before(&ctx, now + 1).unwrap(), 1);
        assert!(!t.row_exists(&ctx, "old").unwrap());
    }
}
