//! Scripted in-memory endpoint
//!
//! Echoes items back as the server representation unless told otherwise.
//! Records every request so tests can assert on batching.

use super::{BatchItemResult, BatchResponse, RemoteEndpoint};
use crate::sync::errors::{SyncError, SyncOpResult};
use crate::sync::item::version_of;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
struct MockState {
    calls: usize,
    item_requests: Vec<Value>,
    batch_requests: Vec<Vec<Value>>,
    failing_calls: HashSet<usize>,
    fail_always: bool,
    rejected_ids: HashSet<String>,
    omitted_ids: HashSet<String>,
    bare_conflict_ids: HashSet<String>,
    server_versions: HashMap<String, Value>,
}

/// In-memory stand-in for the remote authority
#[derive(Default)]
pub struct MockEndpoint {
    state: Mutex<MockState>,
    gate: Mutex<Option<Arc<Notify>>>,
}

fn id_of(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the `n`th request (1-based, item and batch requests share the count)
    pub fn fail_call(&self, n: usize) {
        self.state().failing_calls.insert(n);
    }

    /// Fail every request until cleared
    pub fn set_offline(&self, offline: bool) {
        self.state().fail_always = offline;
    }

    /// Report `success: false` for this item, or fail its single-item request
    pub fn reject_id(&self, id: impl Into<String>) {
        self.state().rejected_ids.insert(id.into());
    }

    /// Leave this item out of batch results
    pub fn omit_id(&self, id: impl Into<String>) {
        self.state().omitted_ids.insert(id.into());
    }

    /// Flag this item as a conflict in batch results without sending data
    pub fn conflict_without_data(&self, id: impl Into<String>) {
        self.state().bare_conflict_ids.insert(id.into());
    }

    /// Answer requests for the item with `representation` instead of an echo
    pub fn set_server_version(&self, id: impl Into<String>, representation: Value) {
        self.state().server_versions.insert(id.into(), representation);
    }

    /// Hold every following request until the returned handle is notified
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&notify));
        notify
    }

    pub fn request_count(&self) -> usize {
        self.state().calls
    }

    pub fn item_requests(&self) -> Vec<Value> {
        self.state().item_requests.clone()
    }

    /// Sizes of the batch requests received so far
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state().batch_requests.iter().map(Vec::len).collect()
    }

    pub fn batch_requests(&self) -> Vec<Vec<Value>> {
        self.state().batch_requests.clone()
    }

    async fn wait_for_gate(&self) {
        let gate = self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn begin_call(&self) -> (usize, bool) {
        let mut state = self.state();
        state.calls += 1;
        let n = state.calls;
        (n, state.fail_always || state.failing_calls.contains(&n))
    }
}

#[async_trait]
impl RemoteEndpoint for MockEndpoint {
    async fn push_item(&self, item: &Value) -> SyncOpResult<Value> {
        let (n, fail) = self.begin_call();
        self.state().item_requests.push(item.clone());
        self.wait_for_gate().await;

        if fail {
            return Err(SyncError::NetworkFailure(format!("scripted failure of request {}", n)));
        }

        let state = self.state();
        let id = id_of(item);
        if let Some(id) = &id {
            if state.rejected_ids.contains(id) {
                return Err(SyncError::NetworkFailure(format!("server rejected item {}", id)));
            }
            if let Some(server) = state.server_versions.get(id) {
                return Ok(server.clone());
            }
        }
        Ok(item.clone())
    }

    async fn push_batch(&self, items: &[Value]) -> SyncOpResult<BatchResponse> {
        let (n, fail) = self.begin_call();
        self.state().batch_requests.push(items.to_vec());
        self.wait_for_gate().await;

        if fail {
            return Err(SyncError::NetworkFailure(format!("scripted failure of request {}", n)));
        }

        let state = self.state();
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let id = id_of(item).unwrap_or_default();
            if state.omitted_ids.contains(&id) {
                continue;
            }
            if state.rejected_ids.contains(&id) {
                results.push(BatchItemResult::failed(index));
                continue;
            }
            if state.bare_conflict_ids.contains(&id) {
                results.push(BatchItemResult { index, success: true, data: None, conflict: true });
                continue;
            }
            match state.server_versions.get(&id) {
                Some(server) => {
                    let conflict = matches!(
                        (version_of(item), version_of(server)),
                        (Some(local), Some(remote)) if local != remote
                    );
                    results.push(BatchItemResult {
                        index,
                        success: true,
                        data: Some(server.clone()),
                        conflict,
                    });
                }
                None => results.push(BatchItemResult::ok(index, Some(item.clone()))),
            }
        }
        Ok(BatchResponse { results })
    }
}
