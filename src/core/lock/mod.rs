//! Index locks stored as rows of the file table
//!
//! A lock goes FREE → HELD on [`Lockable::acquire`] and back on
//! [`Lockable::release`]. Which rows back it depends on [`LockType`].

mod noop;
mod phantom_read;
mod select_for_update;

pub use noop::NoOpLock;
pub use phantom_read::PhantomReadLock;
pub use select_for_update::SelectForUpdateLock;

use crate::context::TxContext;
use crate::dialect::Dialect;
use crate::error::{DirectoryError, Result};
use crate::settings::Configurable;
use crate::table::FileTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub trait Lockable: fmt::Debug {
    fn name(&self) -> &str;

    /// Take the lock, failing with `LockObtainFailed` if someone else holds it
    fn acquire(&mut self) -> Result<()>;

    /// Give the lock up. `LockAlreadyReleased` if it was not held.
    fn release(&mut self) -> Result<()>;

    /// Check the lock is still held
    fn validate(&self) -> Result<()>;

    fn is_held(&self) -> bool;
}

/// How a named lock is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    /// A row exists while the lock is held
    #[default]
    PhantomRead,
    /// A permanent row, locked with `select ... for update nowait` until the
    /// transaction ends
    SelectForUpdate,
    /// No exclusion at all
    NoOp,
}

impl LockType {
    /// Unheld lock handle for `name`
    pub fn create<'t, 'c>(
        self,
        ctx: &'t TxContext<'c>,
        table: &FileTable,
        name: &str,
    ) -> Box<dyn Lockable + 't> {
        match self {
            LockType::PhantomRead => Box::new(PhantomReadLock::new(ctx, table.clone(), name)),
            LockType::SelectForUpdate => Box::new(SelectForUpdateLock::new(ctx, table.clone(), name)),
            LockType::NoOp => Box::new(NoOpLock::new(name)),
        }
    }

    /// Prepare the rows the lock needs, run when the table is created
    pub fn initialize(self, ctx: &TxContext<'_>, table: &FileTable, name: &str) -> Result<()> {
        match self {
            LockType::SelectForUpdate => SelectForUpdateLock::initialize(ctx, table, name),
            LockType::PhantomRead | LockType::NoOp => Ok(()),
        }
    }
}

impl Configurable for LockType {
    fn configure(&self, dialect: &dyn Dialect) -> Result<()> {
        if *self == LockType::SelectForUpdate && !dialect.supports_for_update() {
            return Err(DirectoryError::Configuration(format!(
                "dialect [{}] does not support select for update, required by {:?}",
                dialect.name(),
                self
            )));
        }
        debug!("Lock strategy {:?} accepted for [{}]", self, dialect.name());
        Ok(())
    }
}

pub(crate) fn already_released(table: &FileTable, name: &str) -> DirectoryError {
    DirectoryError::LockAlreadyReleased(format!("{}/{}", table.name(), name))
}
