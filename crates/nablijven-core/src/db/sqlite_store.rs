//! File-backed `SQLite` implementation of [`LocalStore`]

use async_trait::async_trait;
use rusqlite::params;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard, OnceCell};

use super::store::record_key;
use super::{Database, LocalStore, MirrorCollection};
use crate::error::{Error, Result};
use crate::models::{NewPendingOperation, PendingId, PendingOperation};
use crate::util::unix_timestamp_millis;

#[derive(Debug, Clone)]
enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Local store backed by a single `SQLite` connection, opened on first use.
///
/// Construct one per process and share it behind an `Arc`.
pub struct SqliteStore {
    location: StoreLocation,
    db: OnceCell<Mutex<Database>>,
}

impl SqliteStore {
    /// Store at the given file path. Nothing is touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            db: OnceCell::new(),
        }
    }

    /// Non-durable store living in a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            db: OnceCell::new(),
        }
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            StoreLocation::File(path) => Some(path),
            StoreLocation::Memory => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.db.initialized()
    }

    async fn database(&self) -> Result<MutexGuard<'_, Database>> {
        let db = self
            .db
            .get_or_try_init(|| async { self.provision().map(Mutex::new) })
            .await?;
        Ok(db.lock().await)
    }

    fn provision(&self) -> Result<Database> {
        let opened = match &self.location {
            StoreLocation::File(path) => Self::open_file(path),
            StoreLocation::Memory => Database::open_in_memory(),
        };

        opened.map_err(|error| {
            tracing::error!("Failed to open local store: {}", error);
            Error::StorageUnavailable(error.to_string())
        })
    }

    fn open_file(path: &Path) -> Result<Database> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!("Opening local store at {}", path.display());
        Database::open(path)
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn open(&self) -> Result<()> {
        self.database().await.map(drop)
    }

    async fn put(&self, collection: MirrorCollection, records: &[Value]) -> Result<()> {
        let rows = records
            .iter()
            .map(|record| Ok((record_key(collection, record)?, serde_json::to_string(record)?)))
            .collect::<Result<Vec<_>>>()?;
        if rows.is_empty() {
            return Ok(());
        }

        let cached_at = unix_timestamp_millis();
        let mut db = self.database().await?;
        let tx = db.connection_mut().transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (id, data, cached_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, cached_at = excluded.cached_at",
                collection.table()
            ))?;
            for (id, data) in &rows {
                stmt.execute(params![id, data, cached_at])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Stored {} record(s) in {}", rows.len(), collection);
        Ok(())
    }

    async fn get_all(&self, collection: MirrorCollection) -> Result<Vec<Value>> {
        let db = self.database().await?;
        let mut stmt = db
            .connection()
            .prepare(&format!("SELECT data FROM {} ORDER BY id", collection.table()))?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.iter()
            .map(|data| serde_json::from_str(data).map_err(Error::from))
            .collect()
    }

    async fn remove(&self, collection: MirrorCollection, id: &str) -> Result<()> {
        let db = self.database().await?;
        db.connection().execute(
            &format!("DELETE FROM {} WHERE id = ?1", collection.table()),
            params![id],
        )?;
        Ok(())
    }

    async fn append(&self, operation: NewPendingOperation) -> Result<PendingId> {
        let data = serde_json::to_string(&operation.data)?;
        let created_at = unix_timestamp_millis();

        let db = self.database().await?;
        let conn = db.connection();
        conn.execute(
            "INSERT INTO pending_operations (op_type, entity, data, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                operation.op_type.as_str(),
                operation.entity.as_str(),
                data,
                created_at
            ],
        )?;

        let id = PendingId::new(conn.last_insert_rowid());
        tracing::debug!(
            "Queued pending {} {} as #{}",
            operation.entity,
            operation.op_type,
            id
        );
        Ok(id)
    }

    async fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        let db = self.database().await?;
        let mut stmt = db.connection().prepare(
            "SELECT id, op_type, entity, data, created_at
             FROM pending_operations
             ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(id, op_type, entity, data, created_at)| {
                Ok(PendingOperation {
                    id: PendingId::new(id),
                    op_type: op_type.parse()?,
                    entity: entity.parse()?,
                    data: serde_json::from_str(&data)?,
                    timestamp: created_at,
                })
            })
            .collect()
    }

    async fn remove_pending(&self, id: PendingId) -> Result<()> {
        let db = self.database().await?;
        db.connection().execute(
            "DELETE FROM pending_operations WHERE id = ?1",
            params![id.get()],
        )?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        let db = self.database().await?;
        let count: i64 =
            db.connection()
                .query_row("SELECT COUNT(*) FROM pending_operations", [], |row| {
                    row.get(0)
                })?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
