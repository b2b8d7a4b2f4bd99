//! Lock held by the presence of a row

use super::{already_released, Lockable};
use crate::context::TxContext;
use crate::error::{DirectoryError, Result};
use crate::table::FileTable;
use tracing::debug;

/// Held while a row named after the lock exists.
///
/// Acquire probes for the row (when the dialect asks for it) and inserts it;
/// the unique name key turns a concurrent insert into `LockObtainFailed`.
/// Under weak isolation two probes can both miss before either insert lands;
/// the key still lets only one insert commit.
#[derive(Debug)]
pub struct PhantomReadLock<'t, 'c> {
    ctx: &'t TxContext<'c>,
    table: FileTable,
    name: String,
    held: bool,
}

impl<'t, 'c> PhantomReadLock<'t, 'c> {
    pub fn new(ctx: &'t TxContext<'c>, table: FileTable, name: &str) -> Self {
        PhantomReadLock {
            ctx,
            table,
            name: name.to_string(),
            held: false,
        }
    }

    fn obtain_failed(&self, reason: impl std::fmt::Display) -> DirectoryError {
        DirectoryError::LockObtainFailed(format!("{}/{}: {}", self.table.name(), self.name, reason))
    }
}

impl Lockable for PhantomReadLock<'_, '_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self) -> Result<()> {
        if self.table.dialect().use_exists_before_insert_lock()
            && self.table.row_exists(self.ctx, &self.name)?
        {
            return Err(self.obtain_failed("lock row exists"));
        }
        match self.table.insert_empty(self.ctx, &self.name) {
            Ok(()) => {
                self.held = true;
                debug!("{}: obtained lock {}", self.ctx.id(), self.name);
                Ok(())
            }
            Err(err @ DirectoryError::Store { .. }) => Err(self.obtain_failed(err)),
            Err(err) => Err(err),
        }
    }

    fn release(&mut self) -> Result<()> {
        self.held = false;
        if self.table.delete(self.ctx, &self.name)? == 0 {
            return Err(already_released(&self.table, &self.name));
        }
        debug!("{}: released lock {}", self.ctx.id(), self.name);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.table.row_exists(self.ctx, &self.name)? {
            return Err(already_released(&self.table, &self.name));
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.held
    }
}
