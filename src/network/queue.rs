// src/network/queue.rs
//! Outbound request queue
//!
//! Multi-producer, single-consumer FIFO between the session (login), the
//! orchestrator and the writer task. Pushing never blocks, so it can be
//! called from the orchestrator's blocking thread; popping awaits.

use crate::network::messages::{Envelope, Request};
use crate::utils::error::{MinerError, MinerResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Producer side of the outbound queue
///
/// Cheap to clone. Every pushed request gets the next request id of the
/// epoch.
#[derive(Clone)]
pub struct RequestQueue {
    sender: mpsc::UnboundedSender<Envelope>,
    next_id: Arc<AtomicU64>,
}

/// Consumer side of the outbound queue, owned by the writer task
pub struct RequestReceiver {
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

/// Creates a fresh queue whose ids start at zero
pub fn request_queue() -> (RequestQueue, RequestReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        RequestQueue {
            sender,
            next_id: Arc::new(AtomicU64::new(0)),
        },
        RequestReceiver { receiver },
    )
}

impl RequestQueue {
    /// Enqueues a request
    ///
    /// # Returns
    /// - `Ok(id)` with the id assigned to the request
    /// - `Err(MinerError::ChannelError)` once the writer has gone away
    pub fn push(&self, request: Request) -> MinerResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sender
            .send(Envelope { id, request })
            .map_err(|e| {
                MinerError::ChannelError(format!("Outbound queue closed, dropped {}", e.0.request))
            })?;
        Ok(id)
    }
}

impl RequestReceiver {
    /// Waits for the next request; `None` once every producer is gone
    pub async fn pop(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Returns a queued request without waiting
    pub fn try_pop(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }
}
