//! SQLite dialect

use super::Dialect;

/// Dialect for SQLite through `rusqlite`
///
/// SQLite has no row level locks, so `select ... for update` is unsupported.
/// Blob handles opened with `sqlite3_blob_open` stay valid until the row
/// changes, which is what fetch-per-transaction readers rely on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_table_exists(&self) -> bool {
        true
    }

    fn supports_if_exists_before_table_name(&self) -> bool {
        true
    }

    fn supports_transactional_scoped_blobs(&self) -> bool {
        true
    }

    fn supports_current_timestamp_selection(&self) -> bool {
        true
    }

    fn sql_table_exists(&self) -> Option<String> {
        Some("select name from sqlite_master where type = 'table' and lower(name) = ?1".to_string())
    }

    fn current_timestamp_function(&self) -> String {
        "cast((julianday('now') - 2440587.5) * 86400000 as integer)".to_string()
    }

    fn ranged_read_function(&self, column: &str, offset_param: &str, length_param: &str) -> String {
        format!("substr({column}, {offset_param}, {length_param})")
    }

    fn row_locator_column(&self) -> Option<&'static str> {
        Some("rowid")
    }

    fn blob_type(&self, _length_in_k: u64) -> String {
        "blob".to_string()
    }

    fn timestamp_type(&self) -> &'static str {
        "integer"
    }

    fn bit_type(&self) -> &'static str {
        "integer"
    }
}
