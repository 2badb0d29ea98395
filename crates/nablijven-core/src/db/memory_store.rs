//! In-process implementation of [`LocalStore`]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::store::record_key;
use super::{LocalStore, MirrorCollection};
use crate::error::{Error, Result};
use crate::models::{NewPendingOperation, PendingId, PendingOperation};
use crate::util::unix_timestamp_millis;

#[derive(Debug, Default)]
struct MemoryState {
    detentions: BTreeMap<String, Value>,
    students: BTreeMap<String, Value>,
    pending: BTreeMap<PendingId, PendingOperation>,
    next_pending_id: i64,
}

impl MemoryState {
    fn mirror(&mut self, collection: MirrorCollection) -> &mut BTreeMap<String, Value> {
        match collection {
            MirrorCollection::Detentions => &mut self.detentions,
            MirrorCollection::Students => &mut self.students,
        }
    }
}

/// Non-durable store kept in process memory.
///
/// Behaves like [`super::SqliteStore`] except that nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that fails every call with [`Error::StorageUnavailable`].
    pub fn unavailable() -> Self {
        Self {
            state: Mutex::default(),
            unavailable: true,
        }
    }

    async fn state(&self) -> Result<tokio::sync::MutexGuard<'_, MemoryState>> {
        if self.unavailable {
            return Err(Error::StorageUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(self.state.lock().await)
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn open(&self) -> Result<()> {
        self.state().await.map(drop)
    }

    async fn put(&self, collection: MirrorCollection, records: &[Value]) -> Result<()> {
        let keyed = records
            .iter()
            .map(|record| Ok((record_key(collection, record)?, record.clone())))
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.state().await?;
        state.mirror(collection).extend(keyed);
        Ok(())
    }

    async fn get_all(&self, collection: MirrorCollection) -> Result<Vec<Value>> {
        let mut state = self.state().await?;
        Ok(state.mirror(collection).values().cloned().collect())
    }

    async fn remove(&self, collection: MirrorCollection, id: &str) -> Result<()> {
        let mut state = self.state().await?;
        state.mirror(collection).remove(id);
        Ok(())
    }

    async fn append(&self, operation: NewPendingOperation) -> Result<PendingId> {
        let mut state = self.state().await?;
        state.next_pending_id += 1;
        let id = PendingId::new(state.next_pending_id);
        state
            .pending
            .insert(id, operation.into_pending(id, unix_timestamp_millis()));
        Ok(id)
    }

    async fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        let state = self.state().await?;
        Ok(state.pending.values().cloned().collect())
    }

    async fn remove_pending(&self, id: PendingId) -> Result<()> {
        let mut state = self.state().await?;
        state.pending.remove(&id);
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        Ok(self.state().await?.pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use serde_json::json;

    #[tokio::test]
    async fn pending_ids_are_never_reused() {
        let store = MemoryStore::new();
        let first = store
            .append(NewPendingOperation::delete(EntityKind::Student, "s1").unwrap())
            .await
            .unwrap();
        store.remove_pending(first).await.unwrap();

        let second = store
            .append(NewPendingOperation::delete(EntityKind::Student, "s2").unwrap())
            .await
            .unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn put_rejects_whole_batch_on_bad_record() {
        let store = MemoryStore::new();
        let result = store
            .put(
                MirrorCollection::Students,
                &[json!({"id": "s1"}), json!({"id": ""})],
            )
            .await;

        assert!(result.is_err());
        assert!(store
            .get_all(MirrorCollection::Students)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::unavailable();
        assert!(store.open().await.unwrap_err().is_storage_unavailable());
        assert!(store
            .pending_count()
            .await
            .unwrap_err()
            .is_storage_unavailable());
    }
}
