//! Database dialects
//!
//! A dialect supplies everything that differs between databases: column type
//! fragments, a handful of database specific statements, and capability flags
//! the directory checks at configuration time. The table definition builds the
//! rest of the SQL from these pieces, so statements stay parameterized by table
//! and column names only.
//!
//! Timestamps are stored and compared as epoch milliseconds.

mod sqlite;

pub use sqlite::SqliteDialect;

use std::fmt;

/// Database specific SQL fragments and capabilities
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Short name used in log lines and error messages
    fn name(&self) -> &'static str;

    // Capabilities

    /// Whether [`Dialect::sql_table_exists`] is available
    fn supports_table_exists(&self) -> bool {
        false
    }

    /// `drop table if exists T`
    fn supports_if_exists_before_table_name(&self) -> bool {
        false
    }

    /// `drop table T if exists`
    fn supports_if_exists_after_table_name(&self) -> bool {
        false
    }

    /// Row level `select ... for update` locking
    fn supports_for_update(&self) -> bool {
        false
    }

    /// Blob handles that stay readable for the rest of the transaction
    fn supports_transactional_scoped_blobs(&self) -> bool {
        false
    }

    /// Whether the database clock can be selected
    fn supports_current_timestamp_selection(&self) -> bool {
        false
    }

    /// Probe for an existing row before inserting a lock row. Some databases
    /// invalidate the connection when an insert fails.
    fn use_exists_before_insert_lock(&self) -> bool {
        true
    }

    // Statements

    /// Query returning a row when a table named `?1` (lower-cased) exists
    fn sql_table_exists(&self) -> Option<String> {
        None
    }

    /// Query returning the database time in epoch milliseconds
    fn current_timestamp_select(&self) -> String {
        format!("select {}", self.current_timestamp_function())
    }

    /// Expression evaluating to the current time in epoch milliseconds
    fn current_timestamp_function(&self) -> String;

    /// Expression reading `length_param` bytes of `column`, starting at the
    /// 1-based position `offset_param`
    fn ranged_read_function(&self, column: &str, offset_param: &str, length_param: &str) -> String {
        format!("substring({column} from {offset_param} for {length_param})")
    }

    /// Column that addresses a row for incremental blob I/O
    fn row_locator_column(&self) -> Option<&'static str> {
        None
    }

    fn for_update_string(&self) -> &'static str {
        " for update"
    }

    fn for_update_nowait_string(&self) -> &'static str {
        self.for_update_string()
    }

    fn cascade_constraints_string(&self) -> &'static str {
        ""
    }

    fn savepoint(&self, name: &str) -> String {
        format!("savepoint {name}")
    }

    fn release_savepoint(&self, name: &str) -> String {
        format!("release savepoint {name}")
    }

    fn rollback_to_savepoint(&self, name: &str) -> String {
        format!("rollback to savepoint {name}")
    }

    // Types

    fn varchar_type(&self, length: usize) -> String {
        format!("varchar({length})")
    }

    fn blob_type(&self, length_in_k: u64) -> String;

    fn number_type(&self) -> &'static str {
        "integer"
    }

    fn timestamp_type(&self) -> &'static str;

    fn bit_type(&self) -> &'static str;
}
