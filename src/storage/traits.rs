//! Storage traits and error types

use std::fmt;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No resource store at {0}")]
    Missing(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Kinds of reference data the store holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Fandoms,
    Languages,
}

impl ResourceKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Fandoms => "fandom",
            Self::Languages => "language",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "fandom" => Some(Self::Fandoms),
            "language" => Some(Self::Languages),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// One named entry, such as a fandom under "Movies"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub category: String,
    pub name: String,
    /// Short form used in URLs, e.g. a language code
    pub alias: Option<String>,
}

impl ResourceRecord {
    pub fn new(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            alias: None,
        }
    }
}

/// Trait for reference data backends
pub trait ResourceStore {
    /// Every record of `kind`, ordered by category then insertion
    fn load(&self, kind: ResourceKind) -> StorageResult<Vec<ResourceRecord>>;

    /// Adds records, skipping ones already present
    ///
    /// # Returns
    ///
    /// The number of records actually inserted
    fn insert(&mut self, kind: ResourceKind, records: &[ResourceRecord]) -> StorageResult<usize>;

    /// Number of records of `kind`
    fn count(&self, kind: ResourceKind) -> StorageResult<usize>;

    /// Removes every record of `kind`
    fn clear(&mut self, kind: ResourceKind) -> StorageResult<()>;
}
