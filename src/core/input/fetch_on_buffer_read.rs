//! Windowed reader refilled by ranged selects

use super::{BufferedInput, RangeSource};
use crate::context::TxContext;
use crate::error::{DirectoryError, Result};
use crate::table::FileTable;
use tracing::trace;

/// Fetches each window with one select returning the length and only the
/// requested sub-range of the content
#[derive(Debug, Clone)]
pub struct RowRangeSource<'t, 'c> {
    ctx: &'t TxContext<'c>,
    table: FileTable,
    name: String,
    /// 1-based position the next ranged select starts at
    db_position: u64,
}

impl<'t, 'c> RowRangeSource<'t, 'c> {
    pub fn new(ctx: &'t TxContext<'c>, table: FileTable, name: &str) -> Self {
        RowRangeSource {
            ctx,
            table,
            name: name.to_string(),
            db_position: 1,
        }
    }

    pub fn db_position(&self) -> u64 {
        self.db_position
    }
}

impl RangeSource for RowRangeSource<'_, '_> {
    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.db_position = offset + 1;
        trace!(
            "Fetching {}/{} @{} +{}",
            self.table.name(),
            self.name,
            self.db_position,
            buf.len()
        );
        let (_, bytes) = self
            .table
            .fetch_range(self.ctx, &self.name, self.db_position, buf.len())?
            .ok_or_else(|| DirectoryError::FileNotFound(self.name.clone()))?;
        if bytes.len() != buf.len() {
            return Err(DirectoryError::CorruptionOrEof(format!(
                "{}/{}: wanted {} bytes at {}, got {}",
                self.table.name(),
                self.name,
                buf.len(),
                offset,
                bytes.len()
            )));
        }
        buf.copy_from_slice(&bytes);
        self.db_position += buf.len() as u64;
        Ok(())
    }
}

pub type FetchOnBufferReadInput<'t, 'c> = BufferedInput<RowRangeSource<'t, 'c>>;

impl<'t, 'c> BufferedInput<RowRangeSource<'t, 'c>> {
    pub fn open(ctx: &'t TxContext<'c>, table: FileTable, name: &str, buffer_size: usize) -> Result<Self> {
        let length = table
            .size(ctx, name)?
            .ok_or_else(|| DirectoryError::FileNotFound(name.to_string()))?;
        let description = format!("{}/{}", table.name(), name);
        Ok(BufferedInput::new(
            description,
            RowRangeSource::new(ctx, table, name),
            length,
            buffer_size,
        ))
    }
}
