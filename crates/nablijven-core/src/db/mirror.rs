//! Typed access to the mirror collections

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{LocalStore, MirrorCollection};
use crate::error::Result;
use crate::models::{Detention, Student};

/// A remote record that is cached in one of the mirror collections
pub trait MirrorRecord: Serialize + DeserializeOwned {
    const COLLECTION: MirrorCollection;
}

impl MirrorRecord for Student {
    const COLLECTION: MirrorCollection = MirrorCollection::Students;
}

impl MirrorRecord for Detention {
    const COLLECTION: MirrorCollection = MirrorCollection::Detentions;
}

/// Cache records, overwriting earlier copies with the same id.
pub async fn save_records<T: MirrorRecord + Sync>(
    store: &dyn LocalStore,
    records: &[T],
) -> Result<()> {
    let values = records
        .iter()
        .map(serde_json::to_value)
        .collect::<serde_json::Result<Vec<_>>>()?;
    store.put(T::COLLECTION, &values).await
}

/// Every cached record of type `T`.
///
/// Rows that no longer match the model are skipped with a warning rather than
/// failing the whole read.
pub async fn load_records<T: MirrorRecord>(store: &dyn LocalStore) -> Result<Vec<T>> {
    let values = store.get_all(T::COLLECTION).await?;
    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!("Skipping unreadable {} record: {}", T::COLLECTION, error);
                None
            }
        })
        .collect())
}

/// Drop one cached record by id.
pub async fn forget_record<T: MirrorRecord>(store: &dyn LocalStore, id: &str) -> Result<()> {
    store.remove(T::COLLECTION, id).await
}
