//! Lock held through a database row lock

use super::{already_released, Lockable};
use crate::context::TxContext;
use crate::error::{DirectoryError, Result};
use crate::table::FileTable;
use tracing::{debug, trace};

/// Locks the permanent row named after the lock with a non-waiting
/// `select ... for update`. The database holds the row lock until the
/// transaction ends, so release only forgets it locally.
#[derive(Debug)]
pub struct SelectForUpdateLock<'t, 'c> {
    ctx: &'t TxContext<'c>,
    table: FileTable,
    name: String,
    held: bool,
}

impl<'t, 'c> SelectForUpdateLock<'t, 'c> {
    pub fn new(ctx: &'t TxContext<'c>, table: FileTable, name: &str) -> Self {
        SelectForUpdateLock {
            ctx,
            table,
            name: name.to_string(),
            held: false,
        }
    }

    /// Insert the lock row unless it already exists
    pub fn initialize(ctx: &TxContext<'_>, table: &FileTable, name: &str) -> Result<()> {
        if !table.row_exists(ctx, name)? {
            trace!("Creating lock row {}/{}", table.name(), name);
            table.insert_empty(ctx, name)?;
        }
        Ok(())
    }
}

impl Lockable for SelectForUpdateLock<'_, '_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self) -> Result<()> {
        let reason = match self.table.select_for_update_nowait(self.ctx, &self.name) {
            Ok(true) => {
                self.held = true;
                debug!("{}: obtained row lock {}", self.ctx.id(), self.name);
                return Ok(());
            }
            Ok(false) => "lock row missing".to_string(),
            Err(err) => err.to_string(),
        };
        Err(DirectoryError::LockObtainFailed(format!(
            "{}/{}: {}",
            self.table.name(),
            self.name,
            reason
        )))
    }

    fn release(&mut self) -> Result<()> {
        if !self.held {
            return Err(already_released(&self.table, &self.name));
        }
        self.held = false;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.held {
            return Err(already_released(&self.table, &self.name));
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.held
    }
}
