// src/network/writer.rs
//! Outbound half of an epoch
//!
//! Drains the [`RequestReceiver`] in order, registers every request with
//! [`PendingRequests`] and writes it. A failed or timed-out write ends the
//! epoch.

use crate::network::codec::NodeCodec;
use crate::network::pending::PendingRequests;
use crate::network::queue::RequestReceiver;
use futures::SinkExt;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::time;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

/// Writer task state for one epoch
pub struct WriterTask {
    pending: PendingRequests,
    running: CancellationToken,
    io_timeout: Duration,
}

impl WriterTask {
    /// Creates the writer for an epoch
    pub fn new(pending: PendingRequests, running: CancellationToken, io_timeout: Duration) -> Self {
        WriterTask {
            pending,
            running,
            io_timeout,
        }
    }

    /// Writes queued requests until the epoch ends or a write fails
    pub async fn run<W>(self, writer: W, mut requests: RequestReceiver)
    where
        W: AsyncWrite + Unpin,
    {
        let mut sink = FramedWrite::new(writer, NodeCodec::new());

        loop {
            let envelope = tokio::select! {
                biased;
                _ = self.running.cancelled() => break,
                next = requests.pop() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            self.pending.register(&envelope).await;
            log::debug!("Sending {} (id {})", envelope.request, envelope.id);

            match time::timeout(self.io_timeout, sink.send(envelope)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("Failed to write to node: {}", e);
                    break;
                }
                Err(_) => {
                    log::error!("Timed out after {:?} writing to node", self.io_timeout);
                    break;
                }
            }
        }

        self.running.cancel();
        log::debug!("Writer stopped");
    }
}
