// src/network/pending.rs
//! Requests awaiting an answer from the node
//!
//! The writer registers every request it sends; the reader resolves the id
//! echoed in each acknowledgment, so a submit ack is always attributed to
//! the submission it answers.

use crate::network::messages::{Envelope, Request};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Upper bound on tracked requests; the oldest are forgotten first
pub const MAX_PENDING: usize = 1024;

/// Shared id to request map for one epoch
#[derive(Clone)]
pub struct PendingRequests {
    requests: Arc<Mutex<BTreeMap<u64, Request>>>,
    capacity: usize,
}

impl PendingRequests {
    /// Creates an empty tracker holding at most [`MAX_PENDING`] requests
    pub fn new() -> Self {
        Self::with_capacity(MAX_PENDING)
    }

    /// Creates an empty tracker holding at most `capacity` requests
    pub fn with_capacity(capacity: usize) -> Self {
        PendingRequests {
            requests: Arc::new(Mutex::new(BTreeMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Records a request that is about to be written
    pub async fn register(&self, envelope: &Envelope) {
        let mut requests = self.requests.lock().await;
        requests.insert(envelope.id, envelope.request.clone());
        while requests.len() > self.capacity {
            if let Some((id, request)) = requests.pop_first() {
                log::debug!("No answer to request {} ({}), forgetting it", id, request);
            }
        }
    }

    /// Removes and returns the request answered by `id`
    pub async fn resolve(&self, id: u64) -> Option<Request> {
        self.requests.lock().await.remove(&id)
    }

    /// Number of requests still waiting for an answer
    pub async fn len(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
