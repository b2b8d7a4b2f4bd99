//! Windowed reader over a blob handle cached for the transaction

use super::{BufferedInput, RangeSource};
use crate::context::TxContext;
use crate::error::{DirectoryError, Result};
use crate::table::FileTable;

/// Refills from the transaction's cached blob handle for this file, opening
/// it on first use. Every reader of the same file in the same transaction
/// shares the handle.
#[derive(Debug, Clone)]
pub struct TxBlobSource<'t, 'c> {
    ctx: &'t TxContext<'c>,
    table: FileTable,
    name: String,
}

impl<'t, 'c> TxBlobSource<'t, 'c> {
    pub fn new(ctx: &'t TxContext<'c>, table: FileTable, name: &str) -> Self {
        TxBlobSource {
            ctx,
            table,
            name: name.to_string(),
        }
    }
}

impl RangeSource for TxBlobSource<'_, '_> {
    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let (ctx, table, name) = (self.ctx, &self.table, self.name.as_str());
        ctx.blob_cache().read_at(table.name(), name, offset, buf, || {
            let (locator, _) = table
                .locate(ctx, name)?
                .ok_or_else(|| DirectoryError::FileNotFound(name.to_string()))?;
            table.open_blob(ctx, locator)
        })
    }

    fn close(&mut self) -> Result<()> {
        self.ctx.blob_cache().release(self.table.name(), &self.name);
        Ok(())
    }
}

pub type FetchPerTransactionInput<'t, 'c> = BufferedInput<TxBlobSource<'t, 'c>>;

impl<'t, 'c> BufferedInput<TxBlobSource<'t, 'c>> {
    pub fn open(ctx: &'t TxContext<'c>, table: FileTable, name: &str, buffer_size: usize) -> Result<Self> {
        let length = table
            .size(ctx, name)?
            .ok_or_else(|| DirectoryError::FileNotFound(name.to_string()))?;
        let description = format!("{}/{}", table.name(), name);
        Ok(BufferedInput::new(
            description,
            TxBlobSource::new(ctx, table, name),
            length,
            buffer_size,
        ))
    }
}
