//! Directory and per-file settings
//!
//! Every virtual file resolves to one [`FileEntrySettings`]: first by the
//! last three characters of its name (the index file extension), then by its
//! full name, then the directory default. Settings load from TOML; fields left
//! out keep their defaults and `[entries.*]` tables add to or replace the
//! built-in patterns.
//!
//! ```toml
//! query_timeout_secs = 5
//!
//! [default]
//! reader = "fetch_per_transaction"
//! buffer_size = 4096
//!
//! [entries.tis]
//! reader = "fetch_on_open"
//! writer = "ram"
//! ```

use crate::dialect::Dialect;
use crate::error::{DirectoryError, Result};
use crate::handler::HandlerType;
use crate::input::ReaderType;
use crate::lock::LockType;
use crate::output::WriterType;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Strategies that only work with some dialects check themselves here,
/// once, when the directory is built
pub trait Configurable {
    fn configure(&self, dialect: &dyn Dialect) -> Result<()>;
}

/// Strategy choices and tuning for one file pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEntrySettings {
    pub handler: HandlerType,
    pub reader: ReaderType,
    pub writer: WriterType,
    /// Reader window and RAM writer chunk size, in bytes
    pub buffer_size: usize,
    /// Bytes a hybrid writer holds in memory before spilling to a temp file
    pub promotion_threshold: u64,
    pub query_timeout_secs: u64,
    pub lock: LockType,
}

impl Default for FileEntrySettings {
    fn default() -> Self {
        FileEntrySettings {
            handler: HandlerType::MarkDelete,
            reader: ReaderType::FetchOnBufferRead,
            writer: WriterType::RamAndFile,
            buffer_size: 1024,
            promotion_threshold: 16 * 1024,
            query_timeout_secs: 10,
            lock: LockType::PhantomRead,
        }
    }
}

impl FileEntrySettings {
    pub fn with_handler(mut self, handler: HandlerType) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_reader(mut self, reader: ReaderType) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_writer(mut self, writer: WriterType) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_promotion_threshold(mut self, threshold: u64) -> Self {
        self.promotion_threshold = threshold;
        self
    }

    pub fn with_lock(mut self, lock: LockType) -> Self {
        self.lock = lock;
        self
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    fn validate(&self, pattern: &str) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(DirectoryError::Configuration(format!(
                "buffer_size for [{pattern}] must be greater than zero"
            )));
        }
        Ok(())
    }
}

impl Configurable for FileEntrySettings {
    fn configure(&self, dialect: &dyn Dialect) -> Result<()> {
        self.reader.configure(dialect)?;
        self.writer.configure(dialect)?;
        self.lock.configure(dialect)
    }
}

/// Column names of the virtual file table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub name: String,
    pub value: String,
    pub size: String,
    pub last_modified: String,
    pub deleted: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            name: "name_".to_string(),
            value: "value_".to_string(),
            size: "size_".to_string(),
            last_modified: "lf_".to_string(),
            deleted: "deleted_".to_string(),
        }
    }
}

impl ColumnNames {
    fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("name", self.name.as_str()),
            ("value", self.value.as_str()),
            ("size", self.size.as_str()),
            ("last_modified", self.last_modified.as_str()),
            ("deleted", self.deleted.as_str()),
        ]
        .into_iter()
    }
}

/// Settings for a whole directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub columns: ColumnNames,
    pub name_column_length: usize,
    /// Declared size of the content column, in KiB
    pub value_column_length_k: u64,
    /// Age after which mark-deleted rows are purged by the sweep
    pub mark_deleted_sweep_age_secs: u64,
    /// Timeout for directory level statements (DDL, sweeps)
    pub query_timeout_secs: u64,
    /// Names whose lock rows are created with the table
    pub lock_names: Vec<String>,
    #[serde(rename = "default")]
    pub default_entry: FileEntrySettings,
    #[serde(deserialize_with = "with_builtin_entries")]
    pub entries: HashMap<String, FileEntrySettings>,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        DirectorySettings {
            columns: ColumnNames::default(),
            name_column_length: 50,
            value_column_length_k: 500_000,
            mark_deleted_sweep_age_secs: 60 * 60,
            query_timeout_secs: 10,
            lock_names: vec!["write.lock".to_string()],
            default_entry: FileEntrySettings::default(),
            entries: builtin_entries(),
        }
    }
}

/// Patterns every directory starts with
fn builtin_entries() -> HashMap<String, FileEntrySettings> {
    let actual_delete = FileEntrySettings::default().with_handler(HandlerType::ActualDelete);
    let in_memory = FileEntrySettings::default()
        .with_reader(ReaderType::FetchOnOpen)
        .with_writer(WriterType::Ram);
    let segments = in_memory.clone().with_handler(HandlerType::ActualDelete);

    HashMap::from([
        ("del".to_string(), actual_delete.clone()),
        ("tmp".to_string(), actual_delete),
        ("fnm".to_string(), in_memory),
        ("segments".to_string(), segments.clone()),
        ("segments.new".to_string(), segments),
    ])
}

fn with_builtin_entries<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, FileEntrySettings>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = HashMap::<String, FileEntrySettings>::deserialize(deserializer)?;
    let mut entries = builtin_entries();
    entries.extend(configured);
    Ok(entries)
}

impl DirectorySettings {
    /// Parse and validate TOML settings
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: DirectorySettings = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name_column_length == 0 {
            return Err(DirectoryError::Configuration(
                "name_column_length must be greater than zero".to_string(),
            ));
        }
        if let Some((column, _)) = self.columns.iter().find(|(_, name)| name.trim().is_empty()) {
            return Err(DirectoryError::Configuration(format!(
                "column name for [{column}] must not be empty"
            )));
        }
        self.default_entry.validate("default")?;
        for (pattern, entry) in &self.entries {
            entry.validate(pattern)?;
        }
        Ok(())
    }

    /// Add or replace the settings for a suffix or full file name
    pub fn register(&mut self, pattern: impl Into<String>, entry: FileEntrySettings) -> &mut Self {
        self.entries.insert(pattern.into(), entry);
        self
    }

    /// Settings for `name`: suffix match, then full name, then default
    pub fn resolve(&self, name: &str) -> &FileEntrySettings {
        self.resolve_pattern(name)
            .and_then(|pattern| self.entries.get(pattern))
            .unwrap_or(&self.default_entry)
    }

    /// The registered pattern `name` resolves to, if any
    pub fn resolve_pattern<'n>(&self, name: &'n str) -> Option<&'n str> {
        suffix(name)
            .filter(|suffix| self.entries.contains_key(*suffix))
            .or_else(|| self.entries.contains_key(name).then_some(name))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn mark_deleted_sweep_age(&self) -> Duration {
        Duration::from_secs(self.mark_deleted_sweep_age_secs)
    }
}

impl Configurable for DirectorySettings {
    fn configure(&self, dialect: &dyn Dialect) -> Result<()> {
        self.validate()?;
        self.default_entry.configure(dialect)?;
        for entry in self.entries.values() {
            entry.configure(dialect)?;
        }
        Ok(())
    }
}

/// Last three characters, `None` for shorter names
fn suffix(name: &str) -> Option<&str> {
    let count = name.chars().count();
    if count < 3 {
        return None;
    }
    name.char_indices().nth(count - 3).map(|(at, _)| &name[at..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;

    #[test]
    fn test_suffix_on_char_boundaries() {
        assert_eq!(suffix("_1.fnm"), Some("fnm"));
        assert_eq!(suffix("abc"), Some("abc"));
        assert_eq!(suffix("ab"), None);
        assert_eq!(suffix(""), None);
        assert_eq!(suffix("fileé.ü"), Some("é.ü"));
    }

    #[test]
    fn test_resolve_order() {
        let settings = DirectorySettings::default();

        assert_eq!(settings.resolve("_3.fnm").reader, ReaderType::FetchOnOpen);
        assert_eq!(settings.resolve("_3.del").handler, HandlerType::ActualDelete);
        assert_eq!(settings.resolve("_3.tmp").handler, HandlerType::ActualDelete);

        // "segments" ends in "nts", which is not registered
        let segments = settings.resolve("segments");
        assert_eq!(segments.handler, HandlerType::ActualDelete);
        assert_eq!(segments.writer, WriterType::Ram);
        assert_eq!(settings.resolve_pattern("segments.new"), Some("segments.new"));

        let fallback = settings.resolve("_3.cfs");
        assert_eq!(fallback, &settings.default_entry);
        assert_eq!(fallback.handler, HandlerType::MarkDelete);
        assert_eq!(fallback.writer, WriterType::RamAndFile);
    }

    #[test]
    fn test_short_names_use_full_name_or_default() {
        let mut settings = DirectorySettings::default();
        settings.register("ab", FileEntrySettings::default().with_buffer_size(7));
        assert_eq!(settings.resolve("ab").buffer_size, 7);
        assert_eq!(settings.resolve("x"), &settings.default_entry);
    }

    #[test]
    fn test_suffix_beats_full_name() {
        let mut settings = DirectorySettings::default();
        settings.register("xyz", FileEntrySettings::default().with_buffer_size(3));
        settings.register("a.xyz", FileEntrySettings::default().with_buffer_size(5));
        assert_eq!(settings.resolve("a.xyz").buffer_size, 3);
    }

    #[test]
    fn test_toml_overlays_defaults() {
        let settings = DirectorySettings::from_toml_str(
            r#"
            query_timeout_secs = 3
            lock_names = ["write.lock", "commit.lock"]

            [columns]
            name = "fname"

            [default]
            reader = "fetch_per_transaction"
            buffer_size = 4096

            [entries.tis]
            reader = "fetch_on_open"
            writer = "ram"
            "#,
        )
        .unwrap();

        assert_eq!(settings.query_timeout(), Duration::from_secs(3));
        assert_eq!(settings.columns.name, "fname");
        assert_eq!(settings.columns.value, "value_");
        assert_eq!(settings.default_entry.reader, ReaderType::FetchPerTransaction);
        assert_eq!(settings.default_entry.buffer_size, 4096);
        assert_eq!(settings.default_entry.writer, WriterType::RamAndFile);
        assert_eq!(settings.resolve("_0.tis").writer, WriterType::Ram);
        // built-ins survive
        assert_eq!(settings.resolve("_0.del").handler, HandlerType::ActualDelete);
        assert_eq!(settings.lock_names.len(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = DirectorySettings::from_toml_str("[default]\nbuffer_size = 0").unwrap_err();
        assert!(matches!(err, DirectoryError::Configuration(_)));

        let err = DirectorySettings::from_toml_str("name_column_length = 0").unwrap_err();
        assert!(matches!(err, DirectoryError::Configuration(_)));

        let err = DirectorySettings::from_toml_str("[columns]\nsize = \"\"").unwrap_err();
        assert!(matches!(err, DirectoryError::Configuration(_)));

        let err = DirectorySettings::from_toml_str("[default]\nreader = \"psychic\"").unwrap_err();
        assert!(matches!(err, DirectoryError::Settings(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqldir.toml");
        std::fs::write(&path, "mark_deleted_sweep_age_secs = 60\n").unwrap();
        let settings = DirectorySettings::from_file(&path).unwrap();
        assert_eq!(settings.mark_deleted_sweep_age(), Duration::from_secs(60));

        let err = DirectorySettings::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, DirectoryError::Io(_)));
    }

    #[test]
    fn test_configure_against_sqlite() {
        let mut settings = DirectorySettings::default();
        settings.configure(&SqliteDialect).unwrap();

        settings.default_entry.lock = LockType::SelectForUpdate;
        let err = settings.configure(&SqliteDialect).unwrap_err();
        assert!(matches!(err, DirectoryError::Configuration(_)));
    }
}
