//! Bounded views over another reader

use super::{BufferedInput, FileInput, RangeSource, SLICE_BUFFER_SIZE};
use crate::error::{DirectoryError, Result};
use std::fmt;

/// Reads a fixed range of a cloned parent reader
pub struct SliceSource<'t> {
    parent: Box<dyn FileInput<'t> + 't>,
    offset: u64,
}

impl<'t> SliceSource<'t> {
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Clone for SliceSource<'_> {
    fn clone(&self) -> Self {
        SliceSource {
            parent: self.parent.clone_input(),
            offset: self.offset,
        }
    }
}

impl fmt::Debug for SliceSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceSource")
            .field("parent", &self.parent.description())
            .field("offset", &self.offset)
            .finish()
    }
}

impl RangeSource for SliceSource<'_> {
    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.parent.seek(self.offset + offset)?;
        self.parent.read_bytes(buf)
    }
}

pub type SliceInput<'t> = BufferedInput<SliceSource<'t>>;

impl<'t> BufferedInput<SliceSource<'t>> {
    /// Slice `length` bytes of `parent` starting at `offset`
    pub fn new_slice(
        description: &str,
        parent: Box<dyn FileInput<'t> + 't>,
        offset: u64,
        length: u64,
    ) -> Result<Self> {
        let parent_length = parent.length();
        if offset.checked_add(length).map_or(true, |end| end > parent_length) {
            return Err(DirectoryError::OutOfBounds {
                description: description.to_string(),
                offset,
                length,
                parent_length,
            });
        }
        let description = format!("{} [slice={}]", parent.description(), description);
        Ok(BufferedInput::new(
            description,
            SliceSource { parent, offset },
            length,
            SLICE_BUFFER_SIZE,
        ))
    }
}
