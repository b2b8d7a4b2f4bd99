//! Whole-file reader

use super::{eof, seek_past_end, FileInput};
use crate::context::TxContext;
use crate::error::{DirectoryError, Result};
use crate::table::FileTable;
use std::sync::Arc;

/// Loads the row once; every later read and seek is a memory operation.
/// Clones share the loaded bytes.
#[derive(Debug, Clone)]
pub struct FetchOnOpenInput {
    description: String,
    data: Arc<[u8]>,
    position: usize,
}

impl FetchOnOpenInput {
    pub fn open(ctx: &TxContext<'_>, table: &FileTable, name: &str) -> Result<Self> {
        let (size, content) = table
            .fetch(ctx, name)?
            .ok_or_else(|| DirectoryError::FileNotFound(name.to_string()))?;
        if content.len() as u64 != size {
            return Err(DirectoryError::CorruptionOrEof(format!(
                "{}/{}: read {} bytes, row records {}",
                table.name(),
                name,
                content.len(),
                size
            )));
        }
        Ok(Self::from_bytes(format!("{}/{}", table.name(), name), content))
    }

    pub fn from_bytes(description: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        FetchOnOpenInput {
            description: description.into(),
            data: data.into(),
            position: 0,
        }
    }
}

impl<'t> FileInput<'t> for FetchOnOpenInput {
    fn description(&self) -> &str {
        &self.description
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or_else(|| eof(&self.description, self.position as u64, 1, self.length()))?;
        self.position += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.position + buf.len();
        let src = self.data.get(self.position..end).ok_or_else(|| {
            eof(&self.description, self.position as u64, buf.len(), self.length())
        })?;
        buf.copy_from_slice(src);
        self.position = end;
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.position as u64
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.length() {
            return Err(seek_past_end(&self.description, pos, self.length()));
        }
        self.position = pos as usize;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn clone_input(&self) -> Box<dyn FileInput<'t> + 't> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::settings::DirectorySettings;
    use rusqlite::Connection;

    #[test]
    fn test_reads_loaded_bytes() {
        let mut input = FetchOnOpenInput::from_bytes("mem", vec![0, 0, 0, 7, 1, 2]);
        assert_eq!(input.read_i32().unwrap(), 7);
        let mut rest = [0u8; 2];
        input.read_bytes(&mut rest).unwrap();
        assert_eq!(rest, [1, 2]);
        assert!(matches!(input.read_byte(), Err(DirectoryError::CorruptionOrEof(_))));
    }

    #[test]
    fn test_open_missing_and_corrupt_rows() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let table = FileTable::new("files", Arc::new(SqliteDialect), &DirectorySettings::default());
        table.create_table(&ctx).unwrap();

        let err = FetchOnOpenInput::open(&ctx, &table, "missing").unwrap_err();
        assert!(matches!(err, DirectoryError::FileNotFound(_)));

        conn.execute(
            "insert into files (name_, value_, size_, lf_, deleted_) values ('bad', x'0102', 5, 0, 0)",
            [],
        )
        .unwrap();
        let err = FetchOnOpenInput::open(&ctx, &table, "bad").unwrap_err();
        assert!(matches!(err, DirectoryError::CorruptionOrEof(_)));
    }

    #[test]
    fn test_slice_of_loaded_file() {
        let input = FetchOnOpenInput::from_bytes("mem", (0u8..32).collect::<Vec<_>>());
        let mut slice = input.slice("mem[8..16]", 8, 8).unwrap();
        assert_eq!(slice.length(), 8);
        assert_eq!(slice.read_byte().unwrap(), 8);
        slice.seek(7).unwrap();
        assert_eq!(slice.read_byte().unwrap(), 15);
        assert!(slice.read_byte().is_err());
        assert!(matches!(
            input.slice("too far", 30, 8),
            Err(DirectoryError::OutOfBounds { .. })
        ));
    }
}
