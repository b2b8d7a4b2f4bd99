//! Error types for directory operations

use thiserror::Error;

/// Directory operation errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// SQL statement failed
    #[error("Failed to execute sql [{sql}]: {source}")]
    Store {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Lock is held elsewhere or its row is missing
    #[error("Lock obtain failed: {0}")]
    LockObtainFailed(String),

    /// Lock was released, or its row removed, before this call
    #[error("Lock already released: {0}")]
    LockAlreadyReleased(String),

    /// Fewer bytes available than the recorded length
    #[error("Read past EOF: {0}")]
    CorruptionOrEof(String),

    /// Dialect lacks a capability the settings ask for
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No row for the file name
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Slice extends past the end of its parent
    #[error("Slice {description} out of bounds: offset {offset} + length {length} exceeds {parent_length}")]
    OutOfBounds {
        description: String,
        offset: u64,
        length: u64,
        parent_length: u64,
    },

    /// Name does not fit the name column
    #[error("File name too long: {name} (max {max} characters)")]
    NameTooLong { name: String, max: usize },

    /// Scratch file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid TOML
    #[error("Settings parse error: {0}")]
    Settings(#[from] toml::de::Error),
}

impl DirectoryError {
    /// Wrap a driver error together with the statement that produced it
    pub fn store(sql: impl Into<String>, source: rusqlite::Error) -> Self {
        DirectoryError::Store {
            sql: sql.into(),
            source,
        }
    }

    /// True when the database rejected a statement for violating a constraint
    /// (the unique name key in practice)
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            DirectoryError::Store {
                source: rusqlite::Error::SqliteFailure(err, _),
                ..
            } => err.code == rusqlite::ErrorCode::ConstraintViolation,
            _ => false,
        }
    }
}

/// Directory operation result type
pub type Result<T> = std::result::Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_keeps_statement() {
        let err = DirectoryError::store("select 1", rusqlite::Error::InvalidQuery);
        let msg = err.to_string();
        assert!(msg.contains("select 1"));
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn test_constraint_violation_detected() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("create table t (k text primary key); insert into t values ('a');")
            .unwrap();
        let source = conn
            .execute("insert into t values ('a')", [])
            .unwrap_err();
        let err = DirectoryError::store("insert into t values ('a')", source);
        assert!(err.is_constraint_violation());
    }
}
