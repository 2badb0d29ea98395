//! Local durable store interface

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};
use crate::models::{NewPendingOperation, PendingId, PendingOperation};

/// Mirror collections keyed by the record's own `id` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MirrorCollection {
    Detentions,
    Students,
}

impl MirrorCollection {
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Detentions => "detentions",
            Self::Students => "students",
        }
    }
}

impl fmt::Display for MirrorCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Async key-value storage for the two mirrors and the pending-operations log.
///
/// Implementations open lazily: the first call provisions the store, later
/// calls reuse the same handle. When the store cannot be opened every call
/// fails with [`Error::StorageUnavailable`].
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Open the store if it is not open yet.
    async fn open(&self) -> Result<()>;

    /// Upsert a batch of records; either all of them become visible or none.
    async fn put(&self, collection: MirrorCollection, records: &[Value]) -> Result<()>;

    /// Every record of a mirror collection, in unspecified order.
    async fn get_all(&self, collection: MirrorCollection) -> Result<Vec<Value>>;

    /// Delete one mirror record. Absent keys are not an error.
    async fn remove(&self, collection: MirrorCollection, id: &str) -> Result<()>;

    /// Append to the pending-operations log and return the assigned key.
    async fn append(&self, operation: NewPendingOperation) -> Result<PendingId>;

    /// The pending-operations log, oldest first.
    async fn pending_operations(&self) -> Result<Vec<PendingOperation>>;

    /// Delete one pending operation. Absent keys are not an error.
    async fn remove_pending(&self, id: PendingId) -> Result<()>;

    async fn pending_count(&self) -> Result<usize> {
        Ok(self.pending_operations().await?.len())
    }
}

/// Extract the string key of a mirror record.
pub(crate) fn record_key(collection: MirrorCollection, record: &Value) -> Result<String> {
    record
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "{collection} record is missing a string `id` field"
            ))
        })
}
