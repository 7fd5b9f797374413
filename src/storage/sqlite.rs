//! SQLite implementation of the resource store

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    ResourceKind, ResourceRecord, ResourceStore, StorageError, StorageResult,
};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::debug;

/// SQLite resource store
pub struct SqliteResourceStore {
    conn: Connection,
}

impl SqliteResourceStore {
    /// Opens (creating if needed) the store at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Opens an existing store without creating one
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteResourceStore)` - The store
    /// * `Err(StorageError::Missing)` - Nothing exists at `path`
    pub fn open_existing(path: &Path) -> StorageResult<Self> {
        if !path.is_file() {
            return Err(StorageError::Missing(path.display().to_string()));
        }
        Self::new(path)
    }

    /// Creates an in-memory store
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl ResourceStore for SqliteResourceStore {
    fn load(&self, kind: ResourceKind) -> StorageResult<Vec<ResourceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, name, alias FROM resources WHERE kind = ?1 ORDER BY category, id",
        )?;
        let records = stmt
            .query_map(params![kind.to_db_string()], |row| {
                Ok(ResourceRecord {
                    category: row.get(0)?,
                    name: row.get(1)?,
                    alias: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn insert(&mut self, kind: ResourceKind, records: &[ResourceRecord]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO resources (kind, category, name, alias) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in records {
                inserted += stmt.execute(params![
                    kind.to_db_string(),
                    record.category,
                    record.name,
                    record.alias
                ])?;
            }
        }
        tx.commit()?;
        debug!(%kind, inserted, "Resources stored");
        Ok(inserted)
    }

    fn count(&self, kind: ResourceKind) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM resources WHERE kind = ?1",
            params![kind.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn clear(&mut self, kind: ResourceKind) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM resources WHERE kind = ?1",
            params![kind.to_db_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fandom(category: &str, name: &str) -> ResourceRecord {
        ResourceRecord::new(category, name)
    }

    #[test]
    fn test_insert_and_load() {
        let mut store = SqliteResourceStore::new_in_memory().unwrap();
        let inserted = store
            .insert(
                ResourceKind::Fandoms,
                &[fandom("Movies", "Star Wars"), fandom("Anime", "Naruto")],
            )
            .unwrap();
        assert_eq!(inserted, 2);

        let names: Vec<String> = store
            .load(ResourceKind::Fandoms)
            .unwrap()
            .into_iter()
            .map(|record| record.name)
            .collect();
        assert_eq!(names, vec!["Naruto", "Star Wars"]);
        assert!(store.load(ResourceKind::Languages).unwrap().is_empty());
    }

    #[test]
    fn test_duplicates_are_skipped() {
        let mut store = SqliteResourceStore::new_in_memory().unwrap();
        let records = [fandom("Movies", "Alien")];
        store.insert(ResourceKind::Fandoms, &records).unwrap();
        assert_eq!(store.insert(ResourceKind::Fandoms, &records).unwrap(), 0);
        assert_eq!(store.count(ResourceKind::Fandoms).unwrap(), 1);
    }

    #[test]
    fn test_clear_kind() {
        let mut store = SqliteResourceStore::new_in_memory().unwrap();
        store.insert(ResourceKind::Fandoms, &[fandom("Movies", "Alien")]).unwrap();
        let mut english = ResourceRecord::new("languages", "English");
        english.alias = Some("en".to_string());
        store.insert(ResourceKind::Languages, &[english]).unwrap();

        store.clear(ResourceKind::Fandoms).unwrap();
        assert_eq!(store.count(ResourceKind::Fandoms).unwrap(), 0);
        assert_eq!(store.count(ResourceKind::Languages).unwrap(), 1);
    }

    #[test]
    fn test_open_existing_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.db");
        assert!(matches!(
            SqliteResourceStore::open_existing(&path),
            Err(StorageError::Missing(_))
        ));

        SqliteResourceStore::new(&path).unwrap();
        assert!(SqliteResourceStore::open_existing(&path).is_ok());
    }
}
