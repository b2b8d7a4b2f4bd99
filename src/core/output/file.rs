//! Temp-file backed writer

use super::FileOutput;
use crate::context::TxContext;
use crate::error::Result;
use crate::table::FileTable;
use crc32fast::Hasher;
use std::fmt;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;
use tracing::debug;

/// Spills the file to a scratch temp file and streams it into the row on
/// close. The scratch file is removed when the writer is closed or dropped.
pub struct FileSpillOutput<'t, 'c> {
    ctx: &'t TxContext<'c>,
    table: FileTable,
    name: String,
    file: BufWriter<NamedTempFile>,
    position: u64,
    length: u64,
    crc: Hasher,
}

impl<'t, 'c> FileSpillOutput<'t, 'c> {
    pub fn create(ctx: &'t TxContext<'c>, table: FileTable, name: &str) -> Result<Self> {
        let prefix = format!("{}_{}_", sanitize(table.name()), sanitize(name));
        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".spill")
            .tempfile()?;
        debug!("Spilling {}/{} to {}", table.name(), name, file.path().display());
        Ok(FileSpillOutput {
            ctx,
            table,
            name: name.to_string(),
            file: BufWriter::new(file),
            position: 0,
            length: 0,
            crc: Hasher::new(),
        })
    }

    pub fn finish(self) -> Result<()> {
        let mut file = self.file.into_inner().map_err(|e| e.into_error())?;
        file.rewind()?;
        self.table
            .save_stream(self.ctx, &self.name, self.length, &mut file)?;
        file.close()?;
        Ok(())
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

impl FileOutput for FileSpillOutput<'_, '_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf)?;
        self.crc.update(buf);
        self.position += buf.len() as u64;
        self.length = self.length.max(self.position);
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.position = pos;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn checksum(&self) -> u32 {
        self.crc.clone().finalize()
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.finish()
    }
}

impl fmt::Debug for FileSpillOutput<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSpillOutput")
            .field("table", &self.table.name())
            .field("name", &self.name)
            .field("path", &self.file.get_ref().path())
            .field("position", &self.position)
            .field("length", &self.length)
            .finish()
    }
}
