//! Windowed reader shared by the ranged strategies

use super::{eof, seek_past_end, FileInput};
use crate::error::Result;
use std::fmt;

/// Where a [`BufferedInput`] refills its window from
pub trait RangeSource: Clone + fmt::Debug {
    /// Fill `buf` with the bytes starting at the 0-based `offset`
    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Fixed-size read window over a [`RangeSource`]
///
/// Small reads are served from the window; a read larger than the window goes
/// straight to the source and leaves the window empty.
#[derive(Debug, Clone)]
pub struct BufferedInput<S> {
    description: String,
    source: S,
    length: u64,
    buffer: Vec<u8>,
    /// File offset of `buffer[0]`
    buffer_start: u64,
    /// Valid bytes in `buffer`
    buffer_len: usize,
    /// Next byte to hand out
    buffer_pos: usize,
}

impl<S: RangeSource> BufferedInput<S> {
    pub fn new(description: impl Into<String>, source: S, length: u64, buffer_size: usize) -> Self {
        BufferedInput {
            description: description.into(),
            source,
            length,
            buffer: vec![0; buffer_size.max(1)],
            buffer_start: 0,
            buffer_len: 0,
            buffer_pos: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    fn available(&self) -> usize {
        self.buffer_len - self.buffer_pos
    }

    fn refill(&mut self) -> Result<()> {
        let start = self.buffer_start + self.buffer_pos as u64;
        let end = (start + self.buffer.len() as u64).min(self.length);
        if end <= start {
            return Err(eof(&self.description, start, 1, self.length));
        }
        let len = (end - start) as usize;
        self.source.read_range(start, &mut self.buffer[..len])?;
        self.buffer_start = start;
        self.buffer_len = len;
        self.buffer_pos = 0;
        Ok(())
    }
}

impl<'t, S: RangeSource + 't> FileInput<'t> for BufferedInput<S> {
    fn description(&self) -> &str {
        &self.description
    }

    fn read_byte(&mut self) -> Result<u8> {
        if self.buffer_pos >= self.buffer_len {
            self.refill()?;
        }
        let byte = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let wanted = buf.len();
        let available = self.available();
        if wanted <= available {
            buf.copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + wanted]);
            self.buffer_pos += wanted;
            return Ok(());
        }

        let pointer = self.file_pointer();
        if pointer + wanted as u64 > self.length {
            return Err(eof(&self.description, pointer, wanted, self.length));
        }

        let (head, rest) = buf.split_at_mut(available);
        head.copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_len]);
        self.buffer_pos = self.buffer_len;

        if rest.len() < self.buffer.len() {
            self.refill()?;
            let n = rest.len();
            rest.copy_from_slice(&self.buffer[..n]);
            self.buffer_pos = n;
        } else {
            let start = self.buffer_start + self.buffer_pos as u64;
            self.source.read_range(start, rest)?;
            self.buffer_start = start + rest.len() as u64;
            self.buffer_len = 0;
            self.buffer_pos = 0;
        }
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.buffer_start + self.buffer_pos as u64
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.length {
            return Err(seek_past_end(&self.description, pos, self.length));
        }
        if pos >= self.buffer_start && pos < self.buffer_start + self.buffer_len as u64 {
            self.buffer_pos = (pos - self.buffer_start) as usize;
        } else {
            self.buffer_start = pos;
            self.buffer_len = 0;
            self.buffer_pos = 0;
        }
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn clone_input(&self) -> Box<dyn FileInput<'t> + 't> {
        Box::new(self.clone())
    }

    fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}
