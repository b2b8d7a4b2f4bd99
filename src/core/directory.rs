//! Directory facade
//!
//! [`Directory`] is the entry point: it owns the table definition, validates
//! the settings against the dialect once, builds one handler per file pattern
//! and routes each call to the handler for the file name.
//!
//! Every call takes the caller's [`TxContext`]. The directory never commits
//! or rolls back; `sync` only checks the files exist.

use crate::context::TxContext;
use crate::dialect::Dialect;
use crate::error::{DirectoryError, Result};
use crate::handler::{is_static_file, FileEntryHandler};
use crate::input::FileInput;
use crate::lock::Lockable;
use crate::output::FileOutput;
use crate::settings::{Configurable, DirectorySettings};
use crate::table::FileTable;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Directory {
    table: FileTable,
    settings: DirectorySettings,
    handlers: HashMap<String, FileEntryHandler>,
    default_handler: FileEntryHandler,
}

impl Directory {
    /// Build a directory over `table_name`. Fails with `Configuration` when a
    /// configured strategy needs something the dialect lacks.
    pub fn new(
        table_name: impl Into<String>,
        dialect: Arc<dyn Dialect>,
        settings: DirectorySettings,
    ) -> Result<Self> {
        settings.configure(dialect.as_ref())?;
        let table = FileTable::new(table_name, dialect, &settings);

        let handlers = settings
            .entries
            .iter()
            .map(|(pattern, entry)| (pattern.clone(), FileEntryHandler::new(&table, entry.clone())))
            .collect();
        let default_handler = FileEntryHandler::new(&table, settings.default_entry.clone());

        info!(
            "Directory {} ready ({} file patterns)",
            table,
            settings.entries.len()
        );
        Ok(Directory {
            table,
            settings,
            handlers,
            default_handler,
        })
    }

    pub fn with_defaults(table_name: impl Into<String>, dialect: Arc<dyn Dialect>) -> Result<Self> {
        Self::new(table_name, dialect, DirectorySettings::default())
    }

    pub fn table(&self) -> &FileTable {
        &self.table
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.table.dialect()
    }

    pub fn settings(&self) -> &DirectorySettings {
        &self.settings
    }

    /// Handler for `name`: suffix pattern, full name pattern, else default
    pub fn handler_for(&self, name: &str) -> &FileEntryHandler {
        self.settings
            .resolve_pattern(name)
            .and_then(|pattern| self.handlers.get(pattern))
            .unwrap_or(&self.default_handler)
    }

    // Table management

    /// Whether the backing table exists. A failing probe counts as absent.
    pub fn table_exists(&self, ctx: &TxContext<'_>) -> Result<bool> {
        if !self.dialect().supports_table_exists() {
            return Err(DirectoryError::Configuration(format!(
                "dialect [{}] cannot check whether a table exists",
                self.dialect().name()
            )));
        }
        match self.table.table_exists(ctx) {
            Ok(exists) => Ok(exists),
            Err(err) => {
                warn!("Table existence probe for {} failed: {}", self.table, err);
                Ok(false)
            }
        }
    }

    /// Drop the backing table
    pub fn delete(&self, ctx: &TxContext<'_>) -> Result<()> {
        ctx.blob_cache().release_all();
        let dialect = self.dialect();
        if !dialect.supports_if_exists_before_table_name()
            && !dialect.supports_if_exists_after_table_name()
            && dialect.supports_table_exists()
            && !self.table_exists(ctx)?
        {
            return Ok(());
        }
        self.table.drop_table(ctx)?;
        info!("Dropped {}", self.table);
        Ok(())
    }

    /// Drop the table if present, create it and the lock rows
    pub fn create(&self, ctx: &TxContext<'_>) -> Result<()> {
        if let Err(err) = self.delete(ctx) {
            warn!("Could not drop {} before create: {}", self.table, err);
        }
        self.table.create_table(ctx)?;
        for name in &self.settings.lock_names {
            self.settings
                .resolve(name)
                .lock
                .initialize(ctx, &self.table, name)?;
        }
        info!("Created {}", self.table);
        Ok(())
    }

    /// Remove every row, keeping the table
    pub fn delete_content(&self, ctx: &TxContext<'_>) -> Result<()> {
        let removed = self.table.delete_all(ctx)?;
        info!("Deleted content of {} ({} rows)", self.table, removed);
        Ok(())
    }

    /// Purge rows marked deleted longer ago than the configured sweep age
    pub fn delete_mark_deleted(&self, ctx: &TxContext<'_>) -> Result<usize> {
        self.delete_mark_deleted_older_than(ctx, self.settings.mark_deleted_sweep_age())
    }

    /// Purge rows marked deleted longer ago than `age`, using the database
    /// clock when the dialect can select it
    pub fn delete_mark_deleted_older_than(&self, ctx: &TxContext<'_>, age: Duration) -> Result<usize> {
        let now = self.table.current_time_millis(ctx)?;
        let age_ms = i64::try_from(age.as_millis()).unwrap_or(i64::MAX);
        let before = now.saturating_sub(age_ms);
        let purged = self.table.delete_mark_deleted_before(ctx, before)?;
        info!("Swept {} mark-deleted rows from {}", purged, self.table);
        Ok(purged)
    }

    /// Remove the row whatever the deletion policy
    pub fn force_delete_file(&self, ctx: &TxContext<'_>, name: &str) -> Result<()> {
        self.table.delete(ctx, name)?;
        Ok(())
    }

    // File operations

    /// Names of all files not marked deleted
    pub fn list_all(&self, ctx: &TxContext<'_>) -> Result<Vec<String>> {
        self.table.list_names(ctx)
    }

    pub fn file_exists(&self, ctx: &TxContext<'_>, name: &str) -> Result<bool> {
        self.handler_for(name).file_exists(ctx, name)
    }

    /// Recorded length; 0 for a missing file. Mark-deleted files still report
    /// their length.
    pub fn file_length(&self, ctx: &TxContext<'_>, name: &str) -> Result<u64> {
        self.handler_for(name).file_length(ctx, name)
    }

    /// Last modification in epoch millis, 0 for a missing file
    pub fn file_modified(&self, ctx: &TxContext<'_>, name: &str) -> Result<i64> {
        self.handler_for(name).file_modified(ctx, name)
    }

    pub fn touch_file(&self, ctx: &TxContext<'_>, name: &str) -> Result<()> {
        self.handler_for(name).touch_file(ctx, name)
    }

    pub fn delete_file(&self, ctx: &TxContext<'_>, name: &str) -> Result<()> {
        if is_static_file(name) {
            debug!("Deleting static file {}", name);
            return self.force_delete_file(ctx, name);
        }
        self.handler_for(name).delete_file(ctx, name)
    }

    /// Replace `to` with `from`. Two statements; see
    /// [`FileEntryHandler::rename_file`].
    pub fn rename_file(&self, ctx: &TxContext<'_>, from: &str, to: &str) -> Result<()> {
        self.handler_for(from).rename_file(ctx, from, to)
    }

    /// Writer for `name`; the row is written when the writer is closed
    pub fn create_output<'t, 'c>(
        &self,
        ctx: &'t TxContext<'c>,
        name: &str,
    ) -> Result<Box<dyn FileOutput + 't>> {
        if is_static_file(name) {
            debug!("Clearing static file {} before rewrite", name);
            self.force_delete_file(ctx, name)?;
        }
        self.handler_for(name).create_output(ctx, name)
    }

    pub fn open_input<'t, 'c>(
        &self,
        ctx: &'t TxContext<'c>,
        name: &str,
    ) -> Result<Box<dyn FileInput<'t> + 't>> {
        self.handler_for(name).open_input(ctx, name)
    }

    /// Check every name exists. Durability is the caller's commit.
    pub fn sync<S: AsRef<str>>(&self, ctx: &TxContext<'_>, names: &[S]) -> Result<()> {
        for name in names {
            let name = name.as_ref();
            if !self.file_exists(ctx, name)? {
                return Err(DirectoryError::FileNotFound(format!("{name}: cannot sync")));
            }
        }
        Ok(())
    }

    /// Acquire the lock `name`, returning the held handle
    pub fn obtain_lock<'t, 'c>(&self, ctx: &'t TxContext<'c>, name: &str) -> Result<Box<dyn Lockable + 't>> {
        let mut lock = self.handler_for(name).lock(ctx, name);
        lock.acquire()?;
        Ok(lock)
    }

    pub fn close(self) -> Result<()> {
        debug!("Closing directory {}", self.table);
        Ok(())
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("table", &self.table)
            .field("patterns", &self.handlers.len())
            .finish()
    }
}
