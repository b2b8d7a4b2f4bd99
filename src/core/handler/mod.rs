//! Per-pattern file operations
//!
//! A [`FileEntryHandler`] pairs the file table with the settings of one file
//! pattern and carries out every operation on files of that pattern. The
//! only thing handlers disagree on is deletion, picked by [`HandlerType`].

use crate::context::TxContext;
use crate::error::{DirectoryError, Result};
use crate::input::FileInput;
use crate::lock::Lockable;
use crate::output::FileOutput;
use crate::settings::FileEntrySettings;
use crate::table::FileTable;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Files that must never linger as mark-deleted rows
pub const STATIC_FILES: [&str; 3] = ["segments.gen", "write.lock", "commit.lock"];

pub fn is_static_file(name: &str) -> bool {
    STATIC_FILES.contains(&name)
}

/// Deletion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerType {
    /// Remove the row
    ActualDelete,
    /// Flag the row deleted and leave it for the sweep, so readers that
    /// already have the file open keep working
    #[default]
    MarkDelete,
}

#[derive(Debug, Clone)]
pub struct FileEntryHandler {
    table: FileTable,
    settings: FileEntrySettings,
}

impl FileEntryHandler {
    pub fn new(table: &FileTable, settings: FileEntrySettings) -> Self {
        FileEntryHandler {
            table: table.with_query_timeout(settings.query_timeout()),
            settings,
        }
    }

    pub fn handler_type(&self) -> HandlerType {
        self.settings.handler
    }

    pub fn settings(&self) -> &FileEntrySettings {
        &self.settings
    }

    pub fn file_exists(&self, ctx: &TxContext<'_>, name: &str) -> Result<bool> {
        self.table.exists(ctx, name)
    }

    pub fn file_modified(&self, ctx: &TxContext<'_>, name: &str) -> Result<i64> {
        self.table.last_modified(ctx, name)
    }

    pub fn touch_file(&self, ctx: &TxContext<'_>, name: &str) -> Result<()> {
        self.table.touch(ctx, name)
    }

    pub fn file_length(&self, ctx: &TxContext<'_>, name: &str) -> Result<u64> {
        self.table.length(ctx, name)
    }

    pub fn delete_file(&self, ctx: &TxContext<'_>, name: &str) -> Result<()> {
        let affected = match self.settings.handler {
            HandlerType::ActualDelete => self.table.delete(ctx, name)?,
            HandlerType::MarkDelete => self.table.mark_delete(ctx, name)?,
        };
        debug!(
            "{:?} {}/{} ({} rows)",
            self.settings.handler,
            self.table.name(),
            name,
            affected
        );
        Ok(())
    }

    /// Delete each name, returning the ones that failed
    pub fn delete_files(&self, ctx: &TxContext<'_>, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.delete_file(ctx, name).is_err())
            .map(|name| name.to_string())
            .collect()
    }

    /// Delete `to`, then point `from` at it.
    ///
    /// Two statements, not atomic unless the caller's transaction makes them
    /// so. `to` is always removed outright: a mark-deleted row would still hold
    /// the name. A missing `from` fails before `to` is touched, and renaming a
    /// file onto itself leaves it in place.
    pub fn rename_file(&self, ctx: &TxContext<'_>, from: &str, to: &str) -> Result<()> {
        self.table.check_name(to)?;
        if !self.table.row_exists(ctx, from)? {
            return Err(DirectoryError::FileNotFound(from.to_string()));
        }
        if from == to {
            return Ok(());
        }
        self.table.delete(ctx, to)?;
        if self.table.update_name(ctx, from, to)? == 0 {
            return Err(DirectoryError::FileNotFound(from.to_string()));
        }
        debug!("Renamed {}/{} to {}", self.table.name(), from, to);
        Ok(())
    }

    pub fn open_input<'t, 'c>(
        &self,
        ctx: &'t TxContext<'c>,
        name: &str,
    ) -> Result<Box<dyn FileInput<'t> + 't>> {
        self.settings
            .reader
            .open(ctx, &self.table, name, &self.settings)
    }

    /// Unheld lock handle for `name`, of the configured lock type
    pub fn lock<'t, 'c>(&self, ctx: &'t TxContext<'c>, name: &str) -> Box<dyn Lockable + 't> {
        self.settings.lock.create(ctx, &self.table, name)
    }

    pub fn create_output<'t, 'c>(
        &self,
        ctx: &'t TxContext<'c>,
        name: &str,
    ) -> Result<Box<dyn FileOutput + 't>> {
        self.settings
            .writer
            .create(ctx, &self.table, name, &self.settings)
    }
}
