// src/miner/algorithm/mod.rs
//! Proof-of-work solving capability
//!
//! This module contains the solver interface the orchestrator drives and
//! everything needed to run it:
//! - Seed derivation from (job, nonce)
//! - SipHash-2-4 graph generation
//! - The lean Cuckatoo cycle finder and proof verification

/// Lean Cuckatoo solver and proof verification
pub mod cuckatoo;

/// Seed derivation (BLAKE2b-256 of header and nonce)
pub mod seed;

/// SipHash-2-4 edge endpoint generation
pub mod siphash;

use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::sync::Arc;

pub use cuckatoo::{CuckatooSolver, ProofError, SolverParams};
pub use siphash::SipKeys;

/// A cycle found by a solver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    /// Edge bits of the graph the cycle was found in
    pub edge_bits: u8,
    /// Ascending edge indices forming the cycle
    pub nonces: Vec<u64>,
}

impl Proof {
    /// Summary hash of the proof, shown when a solution is found
    pub fn hash(&self) -> [u8; 32] {
        cuckatoo::proof_hash(self)
    }
}

/// Common interface for proof-of-work solvers
///
/// Given the keys derived for one attempt, a solver deterministically
/// searches the graph and returns zero or more candidate proofs. One solver
/// is chosen at startup and shared by every epoch.
pub trait Solver: Send + Sync {
    /// Edge bits of the graphs this solver searches
    ///
    /// Reported to the node with every submission.
    fn edge_bits(&self) -> u8;

    /// Searches the graph keyed by `keys`
    ///
    /// `abort` is polled between stages; once it returns true the solver
    /// gives up and returns no proofs.
    fn solve(&self, keys: &SipKeys, abort: &(dyn Fn() -> bool + Sync)) -> Vec<Proof>;

    /// Checks a candidate proof against the graph keyed by `keys`
    fn verify(&self, keys: &SipKeys, proof: &Proof) -> Result<(), ProofError>;
}

/// Creates the solver for `algorithm`
///
/// # Arguments
/// * `algorithm` - Network variant, which fixes the edge bits
/// * `threads` - Worker threads for graph trimming
///
/// # Returns
/// - `Ok(Arc<dyn Solver>)` on success
/// - `Err(MinerError)` if the solver cannot be built
pub fn create_solver(algorithm: AlgorithmType, threads: usize) -> Result<Arc<dyn Solver>, MinerError> {
    let solver = CuckatooSolver::new(SolverParams::for_algorithm(algorithm), threads)?;
    Ok(Arc::new(solver))
}
