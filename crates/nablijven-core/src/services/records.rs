//! Offline-first access to students and detentions.

use std::collections::HashSet;
use std::sync::Arc;

use crate::db::mirror::{forget_record, load_records, save_records};
use crate::db::{LocalStore, MirrorRecord};
use crate::error::{Error, Result};
use crate::models::{
    filter_by_date, filter_by_date_range, filter_students, group_sessions, DayOfWeek, Detention,
    DetentionSession, EntityKind, NewPendingOperation, PendingId, PendingOperation, Student,
};
use crate::remote::{fetch_detentions, fetch_students, RemoteResult};
use crate::sync::{SyncEngine, SyncReport};
use crate::util::{is_iso_date, new_record_id};

/// Where a read was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Remote,
    Mirror,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    pub records: Vec<T>,
    pub source: Source,
}

/// Result of a local write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub pending_id: PendingId,
    /// Sweep that ran right after queueing, if online
    pub sync: Option<SyncReport>,
}

/// Reads go to the API when online and fall back to the mirror; writes land
/// in the mirror and the pending log first, then sync when online.
#[derive(Clone)]
pub struct RecordService {
    engine: Arc<SyncEngine>,
}

impl RecordService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    fn store(&self) -> &dyn LocalStore {
        self.engine.store().as_ref()
    }

    fn is_online(&self) -> bool {
        self.engine.connectivity().is_online()
    }

    pub async fn students(&self, day: Option<DayOfWeek>) -> Result<Listing<Student>> {
        if self.is_online() {
            let fetched = fetch_students(self.engine.remote().as_ref(), day).await;
            if let Some(students) = self.refresh_mirror(fetched).await {
                return Ok(Listing {
                    records: filter_students(&students, day),
                    source: Source::Remote,
                });
            }
        }

        let cached: Vec<Student> = load_records(self.store()).await?;
        Ok(Listing {
            records: filter_students(&cached, day),
            source: Source::Mirror,
        })
    }

    /// Detentions of one date, or all of them, sorted by date and number.
    pub async fn detentions(&self, date: Option<&str>) -> Result<Listing<Detention>> {
        if let Some(date) = date {
            ensure_date(date)?;
        }
        if self.is_online() {
            let fetched = fetch_detentions(self.engine.remote().as_ref(), date).await;
            if let Some(detentions) = self.refresh_mirror(fetched).await {
                return Ok(Listing {
                    records: filter_by_date(&detentions, date),
                    source: Source::Remote,
                });
            }
        }

        let cached: Vec<Detention> = load_records(self.store()).await?;
        Ok(Listing {
            records: filter_by_date(&cached, date),
            source: Source::Mirror,
        })
    }

    /// Detentions between two dates, inclusive.
    pub async fn detentions_in_range(&self, start: &str, end: &str) -> Result<Listing<Detention>> {
        ensure_date(start)?;
        ensure_date(end)?;
        let Listing { records, source } = self.detentions(None).await?;
        Ok(Listing {
            records: filter_by_date_range(&records, start, end),
            source,
        })
    }

    pub async fn sessions(&self) -> Result<Listing<DetentionSession>> {
        let Listing { records, source } = self.detentions(None).await?;
        Ok(Listing {
            records: group_sessions(&records),
            source,
        })
    }

    /// Number for a new detention appended to the session on `date`.
    pub async fn next_detention_number(&self, date: &str) -> Result<u32> {
        let Listing { records, .. } = self.detentions(Some(date)).await?;
        Ok(u32::try_from(records.len()).unwrap_or(u32::MAX).saturating_add(1))
    }

    /// Create or overwrite a student.
    pub async fn save_student(&self, student: &Student) -> Result<WriteReceipt> {
        student.validate()?;
        save_records(self.store(), std::slice::from_ref(student)).await?;
        self.queue(NewPendingOperation::create_student(student)?)
            .await
    }

    pub async fn delete_student(&self, id: &str) -> Result<WriteReceipt> {
        let operation = NewPendingOperation::delete(EntityKind::Student, id)?;
        forget_record::<Student>(self.store(), id).await?;
        self.queue(operation).await
    }

    pub async fn create_detention(&self, detention: &Detention) -> Result<WriteReceipt> {
        detention.validate()?;
        save_records(self.store(), std::slice::from_ref(detention)).await?;
        self.queue(NewPendingOperation::create_detention(detention)?)
            .await
    }

    pub async fn update_detention(&self, detention: &Detention) -> Result<WriteReceipt> {
        detention.validate()?;
        save_records(self.store(), std::slice::from_ref(detention)).await?;
        self.queue(NewPendingOperation::update_detention(detention)?)
            .await
    }

    pub async fn delete_detention(&self, id: &str) -> Result<WriteReceipt> {
        let operation = NewPendingOperation::delete(EntityKind::Detention, id)?;
        forget_record::<Detention>(self.store(), id).await?;
        self.queue(operation).await
    }

    /// Renumber the session on `date` in the given order, starting at 1.
    ///
    /// Every detention of the session must be listed exactly once. Each
    /// renumbered detention is queued as its own update.
    pub async fn reorder_session(&self, date: &str, ordered_ids: &[String]) -> Result<usize> {
        let Listing { records, .. } = self.detentions(Some(date)).await?;
        if records.len() != ordered_ids.len() {
            return Err(Error::InvalidInput(format!(
                "Session {date} has {} detentions, got {} ids",
                records.len(),
                ordered_ids.len()
            )));
        }

        let mut reordered = Vec::with_capacity(records.len());
        for (index, id) in ordered_ids.iter().enumerate() {
            let mut detention = records
                .iter()
                .find(|detention| &detention.id == id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("detention {id} on {date}")))?;
            if reordered.iter().any(|other: &Detention| &other.id == id) {
                return Err(Error::InvalidInput(format!("Detention {id} listed twice")));
            }
            detention.number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            reordered.push(detention);
        }

        let changed = reordered
            .into_iter()
            .filter(|detention| {
                records
                    .iter()
                    .any(|old| old.id == detention.id && old.number != detention.number)
            })
            .collect::<Vec<_>>();
        if changed.is_empty() {
            return Ok(0);
        }

        let updates = changed
            .iter()
            .map(|detention| -> Result<_> {
                let operation = NewPendingOperation::update_detention(detention)?;
                Ok((detention.id.as_str(), operation))
            })
            .collect::<Result<Vec<_>>>()?;
        self.queue_batch(updates).await?;
        save_records(self.store(), &changed).await?;
        self.sync_if_online().await;
        Ok(changed.len())
    }

    /// Copy every detention of the session on `from_date` to `to_date`.
    ///
    /// Copies get fresh ids, are numbered from 1 in the original order and
    /// take the session day of the new date. Double-period fields are dropped
    /// when the new day has no double periods. Each copy is queued as its own
    /// `create`.
    pub async fn duplicate_session(
        &self,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<Detention>> {
        ensure_date(to_date)?;
        if from_date == to_date {
            return Err(Error::InvalidInput(format!(
                "Session {from_date} cannot be duplicated onto itself"
            )));
        }
        let Listing { records, .. } = self.detentions(Some(from_date)).await?;
        if records.is_empty() {
            return Err(Error::NotFound(format!("detentions on {from_date}")));
        }

        let mut ids = HashSet::with_capacity(records.len());
        let copies = records
            .into_iter()
            .enumerate()
            .map(|(index, original)| -> Result<Detention> {
                let mut id = new_record_id("detention");
                while !ids.insert(id.clone()) {
                    id = new_record_id("detention");
                }
                let day = DayOfWeek::for_date(to_date).unwrap_or(original.day_of_week);
                let mut copy = Detention {
                    id,
                    number: u32::try_from(index + 1).unwrap_or(u32::MAX),
                    date: to_date.to_string(),
                    day_of_week: day,
                    ..original
                };
                if !day.allows_double_period() {
                    copy.is_double_period = None;
                    copy.time_period = None;
                }
                copy.validate()?;
                Ok(copy)
            })
            .collect::<Result<Vec<_>>>()?;

        let creates = copies
            .iter()
            .map(|detention| -> Result<_> {
                let operation = NewPendingOperation::create_detention(detention)?;
                Ok((detention.id.as_str(), operation))
            })
            .collect::<Result<Vec<_>>>()?;
        self.queue_batch(creates).await?;
        save_records(self.store(), &copies).await?;
        self.sync_if_online().await;
        Ok(copies)
    }

    pub async fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        self.store().pending_operations().await
    }

    async fn queue(&self, operation: NewPendingOperation) -> Result<WriteReceipt> {
        let pending_id = self.store().append(operation).await?;
        tracing::debug!("Queued pending operation #{}", pending_id);
        let sync = self.sync_if_online().await;
        Ok(WriteReceipt { pending_id, sync })
    }

    /// Append several operations in order. On failure the ids that did not
    /// make it into the log are logged and the error is returned.
    async fn queue_batch(&self, operations: Vec<(&str, NewPendingOperation)>) -> Result<()> {
        let total = operations.len();
        for (index, (id, operation)) in operations.into_iter().enumerate() {
            if let Err(error) = self.store().append(operation).await {
                let remaining = total - index;
                tracing::error!(
                    "Queued {index} of {total} operations; {remaining} left unqueued from {id}: {}",
                    error
                );
                return Err(error);
            }
        }
        Ok(())
    }

    async fn sync_if_online(&self) -> Option<SyncReport> {
        if !self.is_online() {
            return None;
        }
        match self.engine.sync_pending_operations().await {
            Ok(report) => Some(report),
            Err(error) => {
                tracing::warn!("Sync after local write failed: {}", error);
                None
            }
        }
    }

    /// Cache freshly fetched records. `None` means the caller should fall
    /// back to the mirror.
    async fn refresh_mirror<T: MirrorRecord + Sync>(
        &self,
        fetched: RemoteResult<Vec<T>>,
    ) -> Option<Vec<T>> {
        match fetched {
            Ok(records) => {
                if let Err(error) = save_records(self.store(), &records).await {
                    tracing::warn!("Failed to refresh {} mirror: {}", T::COLLECTION, error);
                }
                Some(records)
            }
            Err(error) => {
                tracing::warn!(
                    "Fetching {} failed, serving cached copy: {}",
                    T::COLLECTION,
                    error
                );
                None
            }
        }
    }
}

fn ensure_date(value: &str) -> Result<()> {
    if is_iso_date(value) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Date must be YYYY-MM-DD, got {value}"
        )))
    }
}
