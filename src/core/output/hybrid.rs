//! Writer that starts in memory and spills to a temp file

use super::{FileOutput, FileSpillOutput, RamBuffer};
use crate::context::TxContext;
use crate::error::Result;
use crate::table::FileTable;
use crc32fast::Hasher;
use std::fmt;
use tracing::debug;

enum Backing<'t, 'c> {
    Ram(RamBuffer),
    File(FileSpillOutput<'t, 'c>),
}

/// Buffers in memory until the bytes written reach the promotion threshold,
/// then moves everything to a [`FileSpillOutput`] and delegates to it.
///
/// The count is cumulative, so rewrites after a seek count too. The checksum
/// lives here and runs across the switch.
pub struct HybridOutput<'t, 'c> {
    ctx: &'t TxContext<'c>,
    table: FileTable,
    name: String,
    threshold: u64,
    written: u64,
    backing: Backing<'t, 'c>,
    crc: Hasher,
}

impl<'t, 'c> HybridOutput<'t, 'c> {
    pub fn new(
        ctx: &'t TxContext<'c>,
        table: FileTable,
        name: &str,
        buffer_size: usize,
        threshold: u64,
    ) -> Self {
        HybridOutput {
            ctx,
            table,
            name: name.to_string(),
            threshold,
            written: 0,
            backing: Backing::Ram(RamBuffer::new(buffer_size)),
            crc: Hasher::new(),
        }
    }

    /// Whether the content has moved to a temp file
    pub fn is_promoted(&self) -> bool {
        matches!(self.backing, Backing::File(_))
    }

    fn promote_if_needed(&mut self, incoming: usize) -> Result<()> {
        let Backing::Ram(buffer) = &self.backing else {
            return Ok(());
        };
        self.written += incoming as u64;
        if self.written < self.threshold {
            return Ok(());
        }

        debug!(
            "Promoting {}/{} to a temp file after {} bytes",
            self.table.name(),
            self.name,
            self.written
        );
        let mut file = FileSpillOutput::create(self.ctx, self.table.clone(), &self.name)?;
        for chunk in buffer.chunks() {
            file.write_bytes(chunk)?;
        }
        file.seek(buffer.position())?;
        self.backing = Backing::File(file);
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        match self.backing {
            Backing::Ram(buffer) => self.table.save_bytes(self.ctx, &self.name, &buffer.to_vec()),
            Backing::File(file) => file.finish(),
        }
    }
}

impl FileOutput for HybridOutput<'_, '_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.promote_if_needed(buf.len())?;
        match &mut self.backing {
            Backing::Ram(buffer) => buffer.write(buf),
            Backing::File(file) => file.write_bytes(buf)?,
        }
        self.crc.update(buf);
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        match &self.backing {
            Backing::Ram(buffer) => buffer.position(),
            Backing::File(file) => file.file_pointer(),
        }
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        match &mut self.backing {
            Backing::Ram(buffer) => {
                buffer.seek(pos);
                Ok(())
            }
            Backing::File(file) => file.seek(pos),
        }
    }

    fn length(&self) -> u64 {
        match &self.backing {
            Backing::Ram(buffer) => buffer.len(),
            Backing::File(file) => file.length(),
        }
    }

    fn checksum(&self) -> u32 {
        self.crc.clone().finalize()
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.finish()
    }
}

impl fmt::Debug for HybridOutput<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridOutput")
            .field("table", &self.table.name())
            .field("name", &self.name)
            .field("threshold", &self.threshold)
            .field("written", &self.written)
            .field("promoted", &self.is_promoted())
            .finish()
    }
}
