//! Readers over virtual files
//!
//! Three strategies, chosen per file pattern:
//!
//! - [`ReaderType::FetchOnOpen`]: load the whole row into memory when opened
//! - [`ReaderType::FetchOnBufferRead`]: keep a window and fetch each refill
//!   with a ranged select
//! - [`ReaderType::FetchPerTransaction`]: same window, refilled from a blob
//!   handle cached in the transaction context
//!
//! All readers share the [`FileInput`] surface. Numbers are big-endian.

mod buffered;
mod fetch_on_buffer_read;
mod fetch_on_open;
mod fetch_per_transaction;
mod slice;

pub use buffered::{BufferedInput, RangeSource};
pub use fetch_on_buffer_read::{FetchOnBufferReadInput, RowRangeSource};
pub use fetch_on_open::FetchOnOpenInput;
pub use fetch_per_transaction::{FetchPerTransactionInput, TxBlobSource};
pub use slice::{SliceInput, SliceSource};

use crate::context::TxContext;
use crate::dialect::Dialect;
use crate::error::{DirectoryError, Result};
use crate::settings::{Configurable, FileEntrySettings};
use crate::table::FileTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Window size used by slices
pub const SLICE_BUFFER_SIZE: usize = 1024;

/// Random access reader over one virtual file
pub trait FileInput<'t>: fmt::Debug {
    fn description(&self) -> &str;

    fn read_byte(&mut self) -> Result<u8>;

    /// Fill `buf` completely or fail with `CorruptionOrEof`
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    fn read_i32(&mut self) -> Result<i32> {
        let mut bytes = [0u8; 4];
        self.read_bytes(&mut bytes)?;
        Ok(i32::from_be_bytes(bytes))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let mut bytes = [0u8; 8];
        self.read_bytes(&mut bytes)?;
        Ok(i64::from_be_bytes(bytes))
    }

    fn file_pointer(&self) -> u64;

    /// Move to `pos`; `pos == length()` is allowed
    fn seek(&mut self, pos: u64) -> Result<()>;

    fn length(&self) -> u64;

    /// Independent reader over the same content, positioned where this one is
    fn clone_input(&self) -> Box<dyn FileInput<'t> + 't>;

    /// Bounded view of `length` bytes starting at `offset`
    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn FileInput<'t> + 't>> {
        Ok(Box::new(SliceInput::new_slice(
            description,
            self.clone_input(),
            offset,
            length,
        )?))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn eof(description: &str, pos: u64, wanted: usize, length: u64) -> DirectoryError {
    DirectoryError::CorruptionOrEof(format!(
        "read past EOF: {description} at {pos} wanted {wanted} bytes, length {length}"
    ))
}

pub(crate) fn seek_past_end(description: &str, pos: u64, length: u64) -> DirectoryError {
    DirectoryError::CorruptionOrEof(format!(
        "seek past EOF: {description} to {pos}, length {length}"
    ))
}

/// How a file's content is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderType {
    FetchOnOpen,
    #[default]
    FetchOnBufferRead,
    FetchPerTransaction,
}

impl ReaderType {
    /// Open `name` with this strategy. Fails with `FileNotFound` when no row
    /// exists.
    pub fn open<'t, 'c>(
        self,
        ctx: &'t TxContext<'c>,
        table: &FileTable,
        name: &str,
        settings: &FileEntrySettings,
    ) -> Result<Box<dyn FileInput<'t> + 't>> {
        debug!("Opening {}/{} with {:?}", table.name(), name, self);
        Ok(match self {
            ReaderType::FetchOnOpen => Box::new(FetchOnOpenInput::open(ctx, table, name)?),
            ReaderType::FetchOnBufferRead => Box::new(FetchOnBufferReadInput::open(
                ctx,
                table.clone(),
                name,
                settings.buffer_size,
            )?),
            ReaderType::FetchPerTransaction => Box::new(FetchPerTransactionInput::open(
                ctx,
                table.clone(),
                name,
                settings.buffer_size,
            )?),
        })
    }
}

impl Configurable for ReaderType {
    fn configure(&self, dialect: &dyn Dialect) -> Result<()> {
        match self {
            ReaderType::FetchPerTransaction
                if !dialect.supports_transactional_scoped_blobs()
                    || dialect.row_locator_column().is_none() =>
            {
                Err(DirectoryError::Configuration(format!(
                    "dialect [{}] does not support transaction scoped blobs, required by {:?}",
                    dialect.name(),
                    self
                )))
            }
            _ => Ok(()),
        }
    }
}
