// src/network/mod.rs
//! Network communication components
//!
//! This module handles the session with the job-providing node:
//! - `Supervisor`: connect, reconnect with backoff, run one epoch at a time
//! - `ReaderTask` / `WriterTask`: the two halves of the message pipeline
//! - `NodeCodec`: newline-delimited JSON-RPC framing

/// Newline-delimited JSON codec
pub mod codec;

/// Request and message types exchanged with the node
pub mod messages;

/// Node address and login settings
pub mod node;

/// Requests awaiting an acknowledgment
pub mod pending;

/// Outbound request queue
pub mod queue;

/// Inbound message routing
pub mod reader;

/// Connection lifecycle and epoch management
///
/// Owns reconnection with backoff and starts and joins the reader,
/// writer and orchestrator of every epoch.
pub mod supervisor;

/// Connectors producing read and write halves
pub mod transport;

/// Outbound request writing
pub mod writer;

// Re-export main components for cleaner imports
pub use codec::NodeCodec;
pub use messages::{NodeMessage, Request, Submission};
pub use node::{Endpoint, NodeConfig};
pub use supervisor::{SessionConfig, Supervisor};
pub use transport::{Connector, TcpConnector};
