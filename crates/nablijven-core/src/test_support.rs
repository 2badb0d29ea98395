//! In-process doubles of the remote API and the local store shared by the unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::db::{LocalStore, MemoryStore, MirrorCollection};
use crate::error::{Error, Result};
use crate::models::{NewPendingOperation, PendingId, PendingOperation};
use crate::remote::{HttpMethod, RemoteApi, RemoteError, RemoteRequest, RemoteResult};

/// Records every request in arrival order and answers with canned JSON.
#[derive(Default)]
pub struct MockRemote {
    requests: Mutex<Vec<RemoteRequest>>,
    failing_records: Mutex<HashSet<String>>,
    rejected_paths: Mutex<HashMap<&'static str, u16>>,
    responses: Mutex<HashMap<&'static str, Value>>,
    network_down: AtomicBool,
    delay: Option<Duration>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer requests touching record `id` with a 500.
    pub fn fail_record(&self, id: &str) {
        self.failing_records.lock().unwrap().insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_records.lock().unwrap().clear();
    }

    pub fn reject_path(&self, path: &'static str, status: u16) {
        self.rejected_paths.lock().unwrap().insert(path, status);
    }

    pub fn set_network_down(&self, down: bool) {
        self.network_down.store(down, Ordering::SeqCst);
    }

    /// Body returned for `GET path`.
    pub fn respond_with(&self, path: &'static str, body: Value) {
        self.responses.lock().unwrap().insert(path, body);
    }

    /// Non-health requests as `METHOD /path?query`, in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.path != "/health")
            .map(ToString::to_string)
            .collect()
    }

    /// Bodies of the non-health requests; `null` when a request had none.
    pub fn bodies(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.path != "/health")
            .map(|request| request.body.clone().unwrap_or(Value::Null))
            .collect()
    }

    fn targets_failing_record(&self, request: &RemoteRequest) -> bool {
        let failing = self.failing_records.lock().unwrap();
        let body_id = request
            .body
            .as_ref()
            .and_then(|body| body.get("id"))
            .and_then(Value::as_str);
        let query_id = request
            .query
            .iter()
            .find(|(key, _)| *key == "id")
            .map(|(_, value)| value.as_str());
        body_id.or(query_id).is_some_and(|id| failing.contains(id))
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn execute(&self, request: &RemoteRequest) -> RemoteResult<Value> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.network_down.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("connection refused".to_string()));
        }
        if let Some(status) = self.rejected_paths.lock().unwrap().get(request.path) {
            return Err(RemoteError::Rejected {
                status: *status,
                message: format!("HTTP {status}"),
            });
        }
        if self.targets_failing_record(request) {
            return Err(RemoteError::Rejected {
                status: 500,
                message: "Fout bij opslaan".to_string(),
            });
        }

        match request.method {
            HttpMethod::Get => Ok(self
                .responses
                .lock()
                .unwrap()
                .get(request.path)
                .cloned()
                .unwrap_or_else(|| json!([]))),
            _ => Ok(json!({"success": true})),
        }
    }
}

/// [`MemoryStore`] with injectable write failures.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_removals: Mutex<HashSet<PendingId>>,
    appends_left: Mutex<Option<usize>>,
    appends: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `remove_pending(id)` once.
    pub fn fail_removal_once(&self, id: PendingId) {
        self.failing_removals.lock().unwrap().insert(id);
    }

    /// Let `count` more appends succeed, then fail every later one.
    pub fn fail_appends_after(&self, count: usize) {
        *self.appends_left.lock().unwrap() = Some(count);
    }

    pub fn successful_appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalStore for FlakyStore {
    async fn open(&self) -> Result<()> {
        self.inner.open().await
    }

    async fn put(&self, collection: MirrorCollection, records: &[Value]) -> Result<()> {
        self.inner.put(collection, records).await
    }

    async fn get_all(&self, collection: MirrorCollection) -> Result<Vec<Value>> {
        self.inner.get_all(collection).await
    }

    async fn remove(&self, collection: MirrorCollection, id: &str) -> Result<()> {
        self.inner.remove(collection, id).await
    }

    async fn append(&self, operation: NewPendingOperation) -> Result<PendingId> {
        {
            let mut left = self.appends_left.lock().unwrap();
            match left.as_mut() {
                Some(0) => return Err(Error::StorageUnavailable("disk full".to_string())),
                Some(remaining) => *remaining -= 1,
                None => {}
            }
        }
        let id = self.inner.append(operation).await?;
        self.appends.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        self.inner.pending_operations().await
    }

    async fn remove_pending(&self, id: PendingId) -> Result<()> {
        if self.failing_removals.lock().unwrap().remove(&id) {
            return Err(Error::StorageUnavailable("disk full".to_string()));
        }
        self.inner.remove_pending(id).await
    }
}
