//! Cuckatoo Miner - Cuckatoo C31/C32 proof-of-work mining client in Rust
//!
//! This crate provides a mining client that keeps a session with a
//! job-providing node and solves the jobs it announces:
//! - Session supervision with reconnection and backoff
//! - A reader/writer message pipeline over newline-delimited JSON-RPC
//! - A lock-free current-job slot and a per-epoch orchestrator
//! - A lean Cuckatoo cycle solver
//! - Performance benchmarking and hardware monitoring

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core implementation including the solver, job slot and orchestrator
pub mod miner;

/// Network communication components for the node session
pub mod network;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{Job, JobSlot, Orchestrator, Proof, Solver, create_solver};
pub use network::{Endpoint, NodeConfig, SessionConfig, Supervisor, TcpConnector};
pub use stats::{HardwareStats, MiningStats, StatsHandle, StatsReporter};
pub use types::AlgorithmType;
pub use utils::{MinerError, MinerResult, init_logging};
