// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the mining process:
//! - The solving capability (Cuckatoo cycle finding and its hashing)
//! - The current-job slot shared with the network reader
//! - The per-epoch orchestrator that drives the solver

/// Proof-of-work solving
///
/// Contains the [`Solver`](algorithm::Solver) interface and the lean
/// Cuckatoo implementation used for C31 and C32.
pub mod algorithm;

/// Mining jobs and the current-job slot
pub mod job;

/// Per-epoch control loop
///
/// Sends keep-alives, requests work while idle and turns solver output
/// into submissions.
pub mod orchestrator;

// Re-export main components for cleaner imports
pub use self::algorithm::{Proof, Solver, create_solver};
pub use self::job::{Job, JobSlot};
pub use self::orchestrator::{Orchestrator, OrchestratorExit, OrchestratorState};
