//! # sqldir - Search index files stored in a SQL table
//!
//! `sqldir` keeps the files of a search-engine index as rows of one database
//! table. Each file is a row holding its name, content, length, modification
//! time and a deleted flag. Readers, writers and locks are picked per file
//! pattern, so large posting files can stream through a temp file while small
//! metadata files stay in memory.
//!
//! - **Three reader strategies**: whole file on open, ranged select per buffer
//!   refill, or a blob handle cached for the transaction
//! - **Three writer strategies**: memory, temp file, or memory promoted to a
//!   temp file past a threshold; each close is one atomic save
//! - **Row based locks**: phantom-read rows or `select ... for update`
//! - **Mark-delete** so open readers survive deletion, with an age sweep
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sqldir::{Directory, FileInput, FileOutput, Result, SqliteDialect, TxContext};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let conn = rusqlite::Connection::open("index.db").expect("open database");
//! let dir = Directory::with_defaults("search_index", Arc::new(SqliteDialect))?;
//!
//! let ctx = TxContext::begin(&conn)?;
//! dir.create(&ctx)?;
//!
//! let mut out = dir.create_output(&ctx, "_0.cfs")?;
//! out.write_i32(42)?;
//! out.write_bytes(b"postings")?;
//! out.close()?;
//!
//! let mut input = dir.open_input(&ctx, "_0.cfs")?;
//! assert_eq!(input.read_i32()?, 42);
//! drop(input);
//!
//! ctx.commit()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Per-pattern settings
//!
//! ```rust,no_run
//! use sqldir::{DirectorySettings, FileEntrySettings, ReaderType, WriterType};
//!
//! # fn main() -> sqldir::Result<()> {
//! let mut settings = DirectorySettings::from_toml_str("query_timeout_secs = 5")?;
//! settings.register(
//!     "tis",
//!     FileEntrySettings::default()
//!         .with_reader(ReaderType::FetchOnOpen)
//!         .with_writer(WriterType::Ram),
//! );
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    context, dialect, directory, error, handler, input, lock, output, settings, table,
};

pub use crate::core::{
    context::{BlobCache, ConnectionId, TxContext},
    dialect::{Dialect, SqliteDialect},
    directory::Directory,
    error::{DirectoryError, Result},
    handler::{FileEntryHandler, HandlerType, STATIC_FILES},
    input::{FileInput, ReaderType},
    lock::{LockType, Lockable},
    output::{FileOutput, WriterType},
    settings::{ColumnNames, Configurable, DirectorySettings, FileEntrySettings},
    table::FileTable,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
