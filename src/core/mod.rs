//! SQL-backed virtual file store
//!
//! ## Layers
//!
//! - [`dialect`] - database specific SQL fragments and capabilities
//! - [`table`] - the virtual file table and its statements
//! - [`context`] - transaction context and its blob handle cache
//! - [`input`] - readers: fetch-on-open, fetch-on-buffer-read,
//!   fetch-per-transaction
//! - [`output`] - writers: RAM, temp file, RAM then temp file
//! - [`lock`] - phantom-read, select-for-update and no-op locks
//! - [`handler`] - deletion policy and per-pattern dispatch
//! - [`settings`] - per-pattern strategy registry, loaded from TOML
//! - [`directory`] - the facade tying it together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Directory                                   │
//! │  name → suffix / full name / default        │
//! ├─────────────────────────────────────────────┤
//! │ FileEntryHandler (per pattern)              │
//! │  delete policy, reader, writer, lock        │
//! ├──────────────┬──────────────┬───────────────┤
//! │ FileInput    │ FileOutput   │ Lockable      │
//! ├──────────────┴──────────────┴───────────────┤
//! │ FileTable + SqlTemplate (statements)        │
//! ├─────────────────────────────────────────────┤
//! │ TxContext (connection, blob cache)          │
//! └─────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod dialect;
pub mod directory;
pub mod error;
pub mod handler;
pub mod input;
pub mod lock;
pub mod output;
pub mod settings;
pub mod table;

pub use context::{BlobCache, ConnectionId, TxContext};
pub use dialect::{Dialect, SqliteDialect};
pub use directory::Directory;
pub use error::{DirectoryError, Result};
pub use handler::{FileEntryHandler, HandlerType};
pub use input::{FileInput, ReaderType};
pub use lock::{LockType, Lockable};
pub use output::{FileOutput, WriterType};
pub use settings::{ColumnNames, Configurable, DirectorySettings, FileEntrySettings};
pub use table::FileTable;
