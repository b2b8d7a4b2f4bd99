//! Writers for virtual files
//!
//! A writer accumulates the file locally and stores it with a single save
//! when closed. Where the bytes accumulate depends on the strategy:
//!
//! - [`WriterType::Ram`]: chunked in memory
//! - [`WriterType::File`]: in a scratch temp file, streamed into the row
//! - [`WriterType::RamAndFile`]: in memory until a threshold, then a temp file
//!
//! Every writer keeps a running CRC-32 over the bytes in the order they were
//! written. Numbers are big-endian.

mod file;
mod hybrid;
mod ram;

pub use file::FileSpillOutput;
pub use hybrid::HybridOutput;
pub use ram::{RamBuffer, RamOutput};

use crate::context::TxContext;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::settings::{Configurable, FileEntrySettings};
use crate::table::FileTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Sequential writer with random repositioning
pub trait FileOutput: fmt::Debug {
    fn name(&self) -> &str;

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    fn file_pointer(&self) -> u64;

    /// Move the write position. Writing past the current length zero-fills
    /// the gap.
    fn seek(&mut self, pos: u64) -> Result<()>;

    fn length(&self) -> u64;

    /// CRC-32 of every byte written so far, in write order
    fn checksum(&self) -> u32;

    /// Store the content with one save and release local resources
    fn close(self: Box<Self>) -> Result<()>;
}

/// How a file's content is accumulated before it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterType {
    Ram,
    File,
    #[default]
    RamAndFile,
}

impl WriterType {
    pub fn create<'t, 'c>(
        self,
        ctx: &'t TxContext<'c>,
        table: &FileTable,
        name: &str,
        settings: &FileEntrySettings,
    ) -> Result<Box<dyn FileOutput + 't>> {
        table.check_name(name)?;
        debug!("Creating {}/{} with {:?}", table.name(), name, self);
        Ok(match self {
            WriterType::Ram => Box::new(RamOutput::new(ctx, table.clone(), name, settings.buffer_size)),
            WriterType::File => Box::new(FileSpillOutput::create(ctx, table.clone(), name)?),
            WriterType::RamAndFile => Box::new(HybridOutput::new(
                ctx,
                table.clone(),
                name,
                settings.buffer_size,
                settings.promotion_threshold,
            )),
        })
    }
}

impl Configurable for WriterType {
    /// Streaming saves fall back to in-memory saves on dialects without a row
    /// locator, so every writer works everywhere
    fn configure(&self, _dialect: &dyn Dialect) -> Result<()> {
        Ok(())
    }
}
