//! Reference data: fandom and language lists
//!
//! The lists live in a SQLite resource store populated ahead of time. They
//! are read into a [`ReferenceData`] value, which answers fandom searches
//! and lists languages without touching the database again.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteResourceStore;
pub use traits::{ResourceKind, ResourceRecord, ResourceStore, StorageError, StorageResult};

use crate::config::ClientConfig;
use crate::{Ao3Error, Result};
use std::path::Path;
use tracing::info;

/// Opens the resource store named in the configuration
///
/// # Returns
///
/// * `Ok(Some(store))` - The configured store
/// * `Ok(None)` - No `database-path` is configured
/// * `Err(Ao3Error::Storage)` - The store is missing or unreadable
pub fn open_store(config: &ClientConfig) -> Result<Option<SqliteResourceStore>> {
    match &config.resources.database_path {
        Some(path) => Ok(Some(SqliteResourceStore::open_existing(Path::new(path))?)),
        None => Ok(None),
    }
}

/// Fandoms and languages read from a resource store
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    fandoms: Option<Vec<String>>,
    languages: Option<Vec<ResourceRecord>>,
}

impl ReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every fandom from the store, replacing any loaded before
    pub fn load_fandoms(&mut self, store: &impl ResourceStore) -> Result<()> {
        let fandoms: Vec<String> = store
            .load(ResourceKind::Fandoms)?
            .into_iter()
            .map(|record| record.name)
            .collect();
        info!(count = fandoms.len(), "Fandoms loaded");
        self.fandoms = Some(fandoms);
        Ok(())
    }

    /// Reads every language from the store, replacing any loaded before
    pub fn load_languages(&mut self, store: &impl ResourceStore) -> Result<()> {
        let languages = store.load(ResourceKind::Languages)?;
        info!(count = languages.len(), "Languages loaded");
        self.languages = Some(languages);
        Ok(())
    }

    /// Fandoms whose name contains `query`, ignoring case
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - Matches in store order, possibly none
    /// * `Err(Ao3Error::Unloaded)` - Fandoms were never loaded, or the store had none
    pub fn search_fandom(&self, query: &str) -> Result<Vec<String>> {
        let fandoms = self
            .fandoms
            .as_ref()
            .ok_or_else(|| Ao3Error::unloaded("Fandom list"))?;
        if fandoms.is_empty() {
            return Err(Ao3Error::Unloaded(
                "Fandom list is empty; populate the resource store".to_string(),
            ));
        }
        let query = query.to_lowercase();
        Ok(fandoms
            .iter()
            .filter(|fandom| fandom.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }

    /// Every loaded language with its short code
    pub fn languages(&self) -> Result<&[ResourceRecord]> {
        self.languages
            .as_deref()
            .ok_or_else(|| Ao3Error::unloaded("Language list"))
    }
}
