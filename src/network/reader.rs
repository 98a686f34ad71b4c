// src/network/reader.rs
//! Inbound half of an epoch
//!
//! Decodes node messages and routes them: jobs go to the [`JobSlot`],
//! acknowledgments are matched against [`PendingRequests`] and reported.
//! The reader is the only place a read failure is detected; it ends the
//! epoch by cancelling the running token.

use crate::miner::job::JobSlot;
use crate::network::codec::NodeCodec;
use crate::network::messages::{Ack, NodeMessage, Request};
use crate::network::pending::PendingRequests;
use crate::stats::{ShareResult, StatsHandle};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::time;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

/// Reader task state for one epoch
pub struct ReaderTask {
    slot: Arc<JobSlot>,
    pending: PendingRequests,
    stats: StatsHandle,
    running: CancellationToken,
    io_timeout: Duration,
}

impl ReaderTask {
    /// Creates the reader for an epoch
    ///
    /// # Arguments
    /// * `slot` - Job slot updated on every job announcement
    /// * `pending` - Requests sent by the writer, resolved by ack id
    /// * `stats` - Receives submission verdicts
    /// * `running` - Epoch token; cancelled when the connection breaks
    /// * `io_timeout` - Longest single wait for data before re-checking `running`
    pub fn new(
        slot: Arc<JobSlot>,
        pending: PendingRequests,
        stats: StatsHandle,
        running: CancellationToken,
        io_timeout: Duration,
    ) -> Self {
        ReaderTask {
            slot,
            pending,
            stats,
            running,
            io_timeout,
        }
    }

    /// Reads until the connection breaks or the epoch ends
    pub async fn run<R>(self, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(reader, NodeCodec::new());

        loop {
            let next = tokio::select! {
                biased;
                _ = self.running.cancelled() => break,
                next = time::timeout(self.io_timeout, frames.next()) => next,
            };

            match next {
                // nothing arrived; go around and re-check the running flag
                Err(_) => continue,
                Ok(None) => {
                    log::warn!("Connection closed by node");
                    break;
                }
                Ok(Some(Err(e))) => {
                    log::error!("Failed to read from node: {}", e);
                    break;
                }
                Ok(Some(Ok(msg))) => self.handle(msg).await,
            }
        }

        self.running.cancel();
        log::debug!("Reader stopped");
    }

    async fn handle(&self, msg: NodeMessage) {
        match msg {
            NodeMessage::Job(job) => {
                log::info!(
                    "New job received: {} for height: {}, difficulty: {}",
                    job.id,
                    job.height,
                    job.difficulty
                );
                self.slot.set(job);
            }
            NodeMessage::Ack(ack) => self.handle_ack(ack).await,
            NodeMessage::Unsupported(method) => {
                log::debug!("Ignoring '{}' notification", method)
            }
        }
    }

    async fn handle_ack(&self, ack: Ack) {
        let request = match ack.id {
            Some(id) => self.pending.resolve(id).await,
            None => None,
        };

        match (ack.method.as_str(), ack.outcome) {
            ("submit", outcome) => {
                let what = match &request {
                    Some(Request::Submit(s)) => format!("job {} (nonce {})", s.job_id, s.nonce),
                    _ => "unknown job".to_string(),
                };
                match outcome {
                    Ok(_) => {
                        log::info!("Solution for {} accepted", what);
                        self.stats.record_share(ShareResult::Accepted);
                    }
                    Err(e) => {
                        log::warn!("Solution for {} rejected: {}", what, e);
                        self.stats.record_share(ShareResult::Rejected);
                    }
                }
            }
            ("login", Ok(_)) => log::info!("Logged in to node"),
            ("login", Err(e)) => log::warn!("Login rejected: {}", e),
            ("getjobtemplate", Err(e)) => log::info!("Node has no job yet: {}", e),
            ("keepalive", Ok(_)) => log::debug!("Keep-alive acknowledged"),
            (method, Err(e)) => log::warn!("Request '{}' failed: {}", method, e),
            (method, Ok(_)) => log::debug!("Request '{}' acknowledged", method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::messages::{Envelope, Submission};
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    struct Harness {
        slot: Arc<JobSlot>,
        pending: PendingRequests,
        shares: crossbeam_channel::Receiver<ShareResult>,
        running: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn start() -> (Harness, DuplexStream) {
        let (node, client) = duplex(4096);
        let slot = Arc::new(JobSlot::new());
        let pending = PendingRequests::new();
        let (share_tx, shares) = crossbeam_channel::unbounded();
        let (attempt_tx, _) = crossbeam_channel::unbounded();
        let running = CancellationToken::new();

        let reader = ReaderTask::new(
            slot.clone(),
            pending.clone(),
            StatsHandle::new(share_tx, attempt_tx),
            running.clone(),
            Duration::from_millis(50),
        );
        let task = tokio::spawn(reader.run(client));
        (
            Harness {
                slot,
                pending,
                shares,
                running,
                task,
            },
            node,
        )
    }

    #[tokio::test]
    async fn jobs_replace_the_slot() {
        let (h, mut node) = start();
        node.write_all(
            b"{\"method\":\"job\",\"params\":{\"job_id\":1,\"height\":10,\"difficulty\":1,\"pre_pow\":\"00\"}}\n\
              {\"method\":\"job\",\"params\":{\"job_id\":2,\"height\":11,\"difficulty\":1,\"pre_pow\":\"01\"}}\n",
        )
        .await
        .unwrap();
        drop(node);

        h.task.await.unwrap();
        assert_eq!(h.slot.current().map(|j| j.id), Some(2));
    }

    #[tokio::test]
    async fn submit_ack_is_matched_and_reported() {
        let (h, mut node) = start();
        h.pending
            .register(&Envelope {
                id: 4,
                request: Request::Submit(Submission {
                    edge_bits: 31,
                    job_id: 7,
                    height: 100,
                    nonce: 5,
                    pow: vec![],
                }),
            })
            .await;

        node.write_all(b"{\"id\":\"4\",\"method\":\"submit\",\"result\":\"ok\",\"error\":null}\n")
            .await
            .unwrap();
        node.write_all(
            b"{\"id\":\"9\",\"method\":\"submit\",\"result\":null,\"error\":{\"code\":-32502,\"message\":\"Solution is stale\"}}\n",
        )
        .await
        .unwrap();
        drop(node);

        h.task.await.unwrap();
        assert_eq!(h.pending.len().await, 0);
        let verdicts: Vec<_> = h.shares.try_iter().collect();
        assert_eq!(verdicts, vec![ShareResult::Accepted, ShareResult::Rejected]);
    }

    #[tokio::test]
    async fn eof_clears_running_flag() {
        let (h, node) = start();
        drop(node);
        h.task.await.unwrap();
        assert!(h.running.is_cancelled());
    }

    #[tokio::test]
    async fn malformed_message_clears_running_flag() {
        let (h, mut node) = start();
        node.write_all(b"{\"method\":\"job\",\"params\":{}}\n").await.unwrap();
        h.task.await.unwrap();
        assert!(h.running.is_cancelled());
        assert!(h.slot.current().is_none());
    }

    #[tokio::test]
    async fn stops_when_epoch_is_cancelled() {
        let (h, _node) = start();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!h.running.is_cancelled());
        h.running.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn node_errors_on_login_and_getjob_are_not_fatal() {
        let (h, mut node) = start();
        node.write_all(
            b"{\"id\":\"0\",\"method\":\"login\",\"error\":{\"code\":-32500,\"message\":\"Login failed\"}}\n\
              {\"id\":\"1\",\"method\":\"getjobtemplate\",\"error\":{\"code\":-32000,\"message\":\"Node is syncing\"}}\n",
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!h.running.is_cancelled());
        drop(node);
        h.task.await.unwrap();
    }
}
