// src/miner/job.rs
//! Mining jobs and the current-job slot
//!
//! The reader task writes the slot whenever the node announces work; the
//! orchestrator reads it before every solving attempt. The slot only ever
//! holds the latest announcement.

use crate::miner::algorithm::SipKeys;
use crate::miner::algorithm::seed::derive_keys;
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// A unit of work announced by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Node-assigned job identifier
    pub id: u64,
    /// Height of the block being mined
    pub height: u64,
    /// Share difficulty the node expects
    pub difficulty: u64,
    /// Serialized block header without nonce and proof
    pub pre_pow: Vec<u8>,
}

impl Job {
    /// Derives the solver keys for one attempt at this job
    pub fn seed(&self, nonce: u64) -> SipKeys {
        derive_keys(&self.pre_pow, nonce)
    }
}

/// Holder of the most recently announced job
///
/// Replacement is atomic: readers see either the old job or the new one,
/// never a mix.
#[derive(Default)]
pub struct JobSlot {
    current: ArcSwapOption<Job>,
}

impl JobSlot {
    /// Creates an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the held job unconditionally
    pub fn set(&self, job: Job) {
        self.current.store(Some(Arc::new(job)));
    }

    /// Returns the current job without consuming it
    ///
    /// `None` until the first announcement arrives.
    pub fn current(&self) -> Option<Arc<Job>> {
        self.current.load_full()
    }
}
