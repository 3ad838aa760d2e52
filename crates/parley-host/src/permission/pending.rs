//! Pending request manager.
//!
//! Tracks requests whose dialog is still open. Whoever removes an entry owns
//! the response for it: the dialog task on resolution, the broker on
//! cancellation, or the poll loop when an entry outlives its deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info, warn};

use parley_core::exchange::RequestKind;

/// How the request reached the broker, and so how it must be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Answered with a response file in the exchange directory.
    File,
    /// Answered on the socket connection by its handler.
    Socket,
}

/// A request awaiting a dialog verdict.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Request ID from the record.
    pub request_id: String,
    /// Sub-protocol of the request.
    pub kind: RequestKind,
    /// Tool name, for logging.
    pub tool_name: String,
    pub transport: Transport,
    /// When the request was registered.
    pub created_at: Instant,
    /// When the poll loop stops waiting for the dialog task.
    pub expires_at: Instant,
}

impl PendingRequest {
    /// Check if the request has expired.
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Parameters for creating a new pending request.
pub struct PendingRequestParams {
    pub request_id: String,
    pub kind: RequestKind,
    pub tool_name: String,
    pub transport: Transport,
    /// Lifetime of the entry.
    pub timeout: Duration,
}

struct PendingEntry {
    request: PendingRequest,
    cancel: oneshot::Sender<()>,
}

fn entry_key(kind: RequestKind, request_id: &str) -> String {
    kind.response_file_name(request_id)
}

/// Manager for pending requests.
#[derive(Clone, Default)]
pub struct PendingManager {
    /// Pending requests keyed by kind and request ID.
    requests: Arc<RwLock<HashMap<String, PendingEntry>>>,
}

impl PendingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and add a new pending request.
    ///
    /// The returned receiver fires (or closes) when the entry is cancelled,
    /// expired or replaced.
    pub async fn create(
        &self,
        params: PendingRequestParams,
    ) -> (PendingRequest, oneshot::Receiver<()>) {
        let now = Instant::now();
        let request = PendingRequest {
            request_id: params.request_id,
            kind: params.kind,
            tool_name: params.tool_name,
            transport: params.transport,
            created_at: now,
            expires_at: now + params.timeout,
        };
        let (cancel, cancelled) = oneshot::channel();
        let key = entry_key(request.kind, &request.request_id);

        let previous = self.requests.write().await.insert(
            key,
            PendingEntry {
                request: request.clone(),
                cancel,
            },
        );
        if previous.is_some() {
            warn!(
                request_id = %request.request_id,
                kind = %request.kind.as_str(),
                "Replaced a pending request with the same ID"
            );
        }
        debug!(
            request_id = %request.request_id,
            kind = %request.kind.as_str(),
            "Added pending request"
        );
        (request, cancelled)
    }

    /// Remove and return a pending request. Only the caller that gets `Some`
    /// may answer it.
    pub async fn take(&self, kind: RequestKind, request_id: &str) -> Option<PendingRequest> {
        let entry = self
            .requests
            .write()
            .await
            .remove(&entry_key(kind, request_id));
        if entry.is_some() {
            debug!(request_id, kind = %kind.as_str(), "Removed pending request");
        }
        entry.map(|e| e.request)
    }

    /// Remove every pending request and signal its dialog task.
    pub async fn drain(&self) -> Vec<PendingRequest> {
        let drained: Vec<PendingEntry> = self.requests.write().await.drain().map(|(_, e)| e).collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "Cancelling pending requests");
        }
        drained.into_iter().map(cancel_entry).collect()
    }

    /// Remove expired requests and signal their dialog tasks.
    pub async fn cleanup_expired(&self) -> Vec<PendingRequest> {
        let mut requests = self.requests.write().await;
        let expired: Vec<String> = requests
            .iter()
            .filter(|(_, e)| e.request.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .iter()
            .filter_map(|key| requests.remove(key))
            .map(|entry| {
                warn!(
                    request_id = %entry.request.request_id,
                    kind = %entry.request.kind.as_str(),
                    "Pending request expired"
                );
                cancel_entry(entry)
            })
            .collect()
    }

    /// Get count of pending requests.
    pub async fn count(&self) -> usize {
        self.requests.read().await.len()
    }
}

fn cancel_entry(entry: PendingEntry) -> PendingRequest {
    // The task may already be gone; a closed receiver is fine.
    let _ = entry.cancel.send(());
    entry.request
}
