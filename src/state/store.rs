use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Store identity: file name plus schema version
pub const DB_NAME: &str = "typst-graphic-file-handles.db";
pub const DB_VERSION: i64 = 1;

const STORE_NAME: &str = "file_handles";
const FILE_HANDLE_KEY: &str = "lastFileHandle";

#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage could not be opened, read or written
    #[error("handle store unavailable: {0}")]
    Unavailable(String),
    /// A record exists but no longer deserializes into a handle
    #[error("stored handle is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Durable single-slot persistence for the current file handle.
///
/// `put` overwrites whatever was stored before. `get` returns `Ok(None)` when
/// nothing was ever stored.
#[async_trait]
pub trait HandleStore<H>: Send + Sync {
    async fn put(&self, handle: &H) -> Result<(), StoreError>;
    async fn get(&self) -> Result<Option<H>, StoreError>;
}

/// SQLite-backed handle store.
///
/// Every operation opens its own connection on a blocking worker, so the
/// store itself is just a path and can be shared freely.
pub struct SqliteHandleStore<H> {
    db_path: PathBuf,
    _handle: PhantomData<fn() -> H>,
}

impl<H> SqliteHandleStore<H> {
    /// Store located in `data_dir`. Nothing is touched on disk until first use.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            db_path: data_dir.join(DB_NAME),
            _handle: PhantomData,
        }
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }
}

/// Open the database and bring its schema to `DB_VERSION`.
fn open_database(db_path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    migrate(&conn)?;
    Ok(conn)
}

/// Versioned schema setup.
///
/// Older stores get the missing table; a store written by a newer schema is
/// recreated rather than rejected.
fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version > DB_VERSION {
        warn!(
            "Handle store has schema version {} (expected {}), recreating",
            version, DB_VERSION
        );
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", STORE_NAME))?;
    }

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key             TEXT PRIMARY KEY,
                handle_json     TEXT NOT NULL,
                stored_at       INTEGER NOT NULL
            )",
            STORE_NAME
        ),
        [],
    )?;

    if version != DB_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {}", DB_VERSION))?;
        info!("📁 Handle store schema at version {}", DB_VERSION);
    }

    Ok(())
}

fn put_blocking(db_path: &Path, handle_json: &str) -> Result<(), StoreError> {
    let conn = open_database(db_path)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {} (key, handle_json, stored_at) VALUES (?1, ?2, ?3)",
            STORE_NAME
        ),
        rusqlite::params![FILE_HANDLE_KEY, handle_json, Utc::now().timestamp()],
    )?;
    Ok(())
}

fn get_blocking(db_path: &Path) -> Result<Option<String>, StoreError> {
    let conn = open_database(db_path)?;
    let row: Option<(String, i64)> = conn
        .query_row(
            &format!(
                "SELECT handle_json, stored_at FROM {} WHERE key = ?1",
                STORE_NAME
            ),
            [FILE_HANDLE_KEY],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(row.map(|(json, stored_at)| {
        if let Some(when) = Utc.timestamp_opt(stored_at, 0).single() {
            debug!("Found stored file handle from {}", when.to_rfc3339());
        }
        json
    }))
}

#[async_trait]
impl<H> HandleStore<H> for SqliteHandleStore<H>
where
    H: Serialize + DeserializeOwned + Send + Sync,
{
    async fn put(&self, handle: &H) -> Result<(), StoreError> {
        let handle_json = serde_json::to_string(handle)?;
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || put_blocking(&db_path, &handle_json))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Task join error: {}", e)))?
    }

    async fn get(&self) -> Result<Option<H>, StoreError> {
        let db_path = self.db_path.clone();

        let json = tokio::task::spawn_blocking(move || get_blocking(&db_path))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Task join error: {}", e)))??;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl<H> std::fmt::Debug for SqliteHandleStore<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHandleStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::handle::LocalFileHandle;

    fn store(dir: &Path) -> SqliteHandleStore<LocalFileHandle> {
        SqliteHandleStore::new(dir)
    }

    #[tokio::test]
    async fn test_empty_store_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store(dir.path()).get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_single_slot_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.put(&LocalFileHandle::new("/docs/a.typ")).await.unwrap();
        store.put(&LocalFileHandle::new("/docs/b.typ")).await.unwrap();

        assert_eq!(
            store.get().await.unwrap(),
            Some(LocalFileHandle::new("/docs/b.typ"))
        );

        let conn = Connection::open(store.path()).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_handles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        store(dir.path())
            .put(&LocalFileHandle::new("/docs/notes.txt"))
            .await
            .unwrap();

        let reopened = store(dir.path());
        assert_eq!(
            reopened.get().await.unwrap(),
            Some(LocalFileHandle::new("/docs/notes.txt"))
        );
    }

    #[tokio::test]
    async fn test_newer_schema_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DB_NAME);
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE file_handles (id INTEGER PRIMARY KEY, blob BLOB);
                 PRAGMA user_version = 7;",
            )
            .unwrap();
        }

        let store = store(dir.path());
        assert_eq!(store.get().await.unwrap(), None);
        store.put(&LocalFileHandle::new("/docs/a.typ")).await.unwrap();
        assert!(store.get().await.unwrap().is_some());

        let conn = Connection::open(&path).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, DB_VERSION);
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        put_blocking(store.path(), "{not json").unwrap();

        assert!(matches!(store.get().await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_unavailable_storage() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the data directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();

        let store = store(&blocker);
        let result = store.put(&LocalFileHandle::new("/docs/a.typ")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
