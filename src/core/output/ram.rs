//! In-memory writer

use super::FileOutput;
use crate::context::TxContext;
use crate::error::Result;
use crate::table::FileTable;
use crc32fast::Hasher;
use std::fmt;

/// Growable list of fixed-size chunks with a write position
#[derive(Debug, Clone)]
pub struct RamBuffer {
    chunks: Vec<Vec<u8>>,
    chunk_size: usize,
    position: u64,
    length: u64,
}

impl RamBuffer {
    pub fn new(chunk_size: usize) -> Self {
        RamBuffer {
            chunks: Vec::new(),
            chunk_size: chunk_size.max(1),
            position: 0,
            length: 0,
        }
    }

    pub fn write(&mut self, mut buf: &[u8]) {
        while !buf.is_empty() {
            let index = (self.position / self.chunk_size as u64) as usize;
            let offset = (self.position % self.chunk_size as u64) as usize;
            while self.chunks.len() <= index {
                self.chunks.push(vec![0; self.chunk_size]);
            }
            let n = buf.len().min(self.chunk_size - offset);
            self.chunks[index][offset..offset + n].copy_from_slice(&buf[..n]);
            buf = &buf[n..];
            self.position += n as u64;
        }
        self.length = self.length.max(self.position);
    }

    pub fn seek(&mut self, pos: u64) {
        self.position = pos;
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Written content, chunk by chunk, trimmed to the length
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let mut remaining = self.length as usize;
        self.chunks.iter().map_while(move |chunk| {
            if remaining == 0 {
                return None;
            }
            let n = remaining.min(chunk.len());
            remaining -= n;
            Some(&chunk[..n])
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length as usize);
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }
}

/// Keeps the whole file in memory and saves it in one statement on close
pub struct RamOutput<'t, 'c> {
    ctx: &'t TxContext<'c>,
    table: FileTable,
    name: String,
    buffer: RamBuffer,
    crc: Hasher,
}

impl<'t, 'c> RamOutput<'t, 'c> {
    pub fn new(ctx: &'t TxContext<'c>, table: FileTable, name: &str, buffer_size: usize) -> Self {
        RamOutput {
            ctx,
            table,
            name: name.to_string(),
            buffer: RamBuffer::new(buffer_size),
            crc: Hasher::new(),
        }
    }

    pub fn finish(self) -> Result<()> {
        self.table
            .save_bytes(self.ctx, &self.name, &self.buffer.to_vec())
    }
}

impl FileOutput for RamOutput<'_, '_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.buffer.write(buf);
        self.crc.update(buf);
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.buffer.position()
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.buffer.seek(pos);
        Ok(())
    }

    fn length(&self) -> u64 {
        self.buffer.len()
    }

    fn checksum(&self) -> u32 {
        self.crc.clone().finalize()
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.finish()
    }
}

impl fmt::Debug for RamOutput<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamOutput")
            .field("table", &self.table.name())
            .field("name", &self.name)
            .field("position", &self.buffer.position())
            .field("length", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_spans_chunks() {
        let mut buffer = RamBuffer::new(3);
        buffer.write(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(buffer.len(), 7);
        assert_eq!(buffer.chunks().count(), 3);
        assert_eq!(buffer.to_vec(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_buffer_overwrite_and_gap() {
        let mut buffer = RamBuffer::new(4);
        buffer.write(&[1, 1, 1, 1, 1]);
        buffer.seek(2);
        buffer.write(&[9]);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.position(), 3);

        buffer.seek(9);
        buffer.write(&[7]);
        assert_eq!(buffer.to_vec(), vec![1, 1, 9, 1, 1, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = RamBuffer::new(8);
        assert!(buffer.is_empty());
        assert!(buffer.to_vec().is_empty());
    }
}
