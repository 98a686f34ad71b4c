// src/network/transport.rs
//! Byte transport to the node
//!
//! A [`Connector`] opens one connection and hands back independent read
//! and write halves. The session owns both halves for the lifetime of an
//! epoch; a broken connection shows up as EOF or an error on either side.

use crate::network::node::Endpoint;
use crate::utils::error::{MinerError, MinerResult};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time;

/// Opens connections to the node
pub trait Connector: Send + Sync + 'static {
    /// Read half handed to the reader task
    type Reader: AsyncRead + Unpin + Send + 'static;
    /// Write half handed to the writer task
    type Writer: AsyncWrite + Unpin + Send + 'static;

    /// Connects to `endpoint`
    ///
    /// # Errors
    /// Returns `MinerError::ConnectionError` if the node cannot be reached.
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = MinerResult<(Self::Reader, Self::Writer)>> + Send;
}

/// Plain TCP connector
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector that gives up on a connect after `connect_timeout`
    pub fn new(connect_timeout: Duration) -> Self {
        TcpConnector { connect_timeout }
    }
}

impl Connector for TcpConnector {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    async fn connect(&self, endpoint: &Endpoint) -> MinerResult<(OwnedReadHalf, OwnedWriteHalf)> {
        let stream = time::timeout(
            self.connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| {
            MinerError::ConnectionError(format!(
                "Timed out after {:?} connecting to {}",
                self.connect_timeout, endpoint
            ))
        })?
        .map_err(|e| MinerError::ConnectionError(format!("Connection to {} failed: {}", endpoint, e)))?;

        stream.set_nodelay(true)?;
        Ok(stream.into_split())
    }
}
