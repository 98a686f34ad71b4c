// src/miner/algorithm/cuckatoo.rs
//! Cuckatoo cycle finding
//!
//! A lean solver: edges live in a bitmap, each trimming round counts node
//! degrees on one side of the bipartite graph and drops edges whose endpoint
//! is a leaf. Once trimming stops making progress, the surviving edges are
//! fed to a cuckoo forest which reports every cycle of the proof length.
//!
//! Trimming is parallelised with rayon on a pool owned by the solver.

use super::seed::blake2b_256;
use super::siphash::{SipKeys, sipnode};
use super::{Proof, Solver};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Cycle length required by the network
pub const PROOF_SIZE: usize = 42;

/// Upper bound on trimming rounds per graph
pub const DEFAULT_TRIM_ROUNDS: usize = 128;

/// Shape of the graph and proof a solver works with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverParams {
    /// log2 of the number of edges (and of nodes per side)
    pub edge_bits: u8,
    /// Number of edges in a valid cycle
    pub proof_size: usize,
    /// Maximum trimming rounds before the cycle search
    pub trim_rounds: usize,
}

impl SolverParams {
    /// Parameters for a network algorithm
    pub fn for_algorithm(algorithm: AlgorithmType) -> Self {
        SolverParams {
            edge_bits: algorithm.edge_bits(),
            proof_size: PROOF_SIZE,
            trim_rounds: DEFAULT_TRIM_ROUNDS,
        }
    }

    /// Checks the parameters describe a graph this solver can build
    pub fn validate(&self) -> Result<(), MinerError> {
        if !(6..=32).contains(&self.edge_bits) {
            return Err(MinerError::SolverError(format!(
                "edge bits must be between 6 and 32, got {}",
                self.edge_bits
            )));
        }
        if self.proof_size < 4 || self.proof_size % 2 != 0 {
            return Err(MinerError::SolverError(format!(
                "proof size must be even and at least 4, got {}",
                self.proof_size
            )));
        }
        Ok(())
    }

    /// Number of edges in the graph
    pub fn num_edges(&self) -> u64 {
        1u64 << self.edge_bits
    }

    /// Mask applied to hashes to obtain node indices
    pub fn node_mask(&self) -> u64 {
        self.num_edges() - 1
    }
}

/// Reasons a proof fails verification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// Proof has the wrong number of edges
    #[error("proof has {0} edges, expected {1}")]
    WrongLength(usize, usize),
    /// An edge index lies outside the graph
    #[error("edge {0} is out of range")]
    TooBig(u64),
    /// Edge indices are not strictly ascending
    #[error("edges are not strictly ascending")]
    NotAscending,
    /// A node has more than two incident proof edges
    #[error("branch in cycle")]
    Branch,
    /// A node has a single incident proof edge
    #[error("cycle dead ends")]
    DeadEnd,
    /// The edges form more than one cycle
    #[error("cycle too short")]
    ShortCycle,
}

/// Checks that `proof` is a single cycle of the configured length
pub fn verify(keys: &SipKeys, proof: &Proof, params: &SolverParams) -> Result<(), ProofError> {
    let n = params.proof_size;
    if proof.nonces.len() != n {
        return Err(ProofError::WrongLength(proof.nonces.len(), n));
    }

    let mask = params.node_mask();
    // endpoint 2k is the U side of edge k, 2k+1 its V side; the low bit tags the side
    let mut uvs = vec![0u64; 2 * n];
    for (k, &edge) in proof.nonces.iter().enumerate() {
        if edge >= params.num_edges() {
            return Err(ProofError::TooBig(edge));
        }
        if k > 0 && edge <= proof.nonces[k - 1] {
            return Err(ProofError::NotAscending);
        }
        uvs[2 * k] = sipnode(keys, edge, 0, mask) << 1;
        uvs[2 * k + 1] = (sipnode(keys, edge, 1, mask) << 1) | 1;
    }

    let mut walked = 0;
    let mut i = 0;
    loop {
        let mut j = i;
        for k in 0..2 * n {
            if k != i && uvs[k] == uvs[i] {
                if j != i {
                    return Err(ProofError::Branch);
                }
                j = k;
            }
        }
        if j == i {
            return Err(ProofError::DeadEnd);
        }
        i = j ^ 1;
        walked += 1;
        if i == 0 {
            break;
        }
    }

    if walked == n {
        Ok(())
    } else {
        Err(ProofError::ShortCycle)
    }
}

/// Lean-memory Cuckatoo solver
pub struct CuckatooSolver {
    params: SolverParams,
    pool: rayon::ThreadPool,
}

impl CuckatooSolver {
    /// Creates a solver for `params` running on `threads` worker threads
    ///
    /// # Errors
    /// Returns `MinerError::SolverError` if the parameters are invalid or the
    /// thread pool cannot be built.
    pub fn new(params: SolverParams, threads: usize) -> Result<Self, MinerError> {
        params.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("cuckatoo-{}", i))
            .build()
            .map_err(|e| MinerError::SolverError(format!("Failed to build thread pool: {}", e)))?;
        Ok(CuckatooSolver { params, pool })
    }
}

impl Solver for CuckatooSolver {
    fn edge_bits(&self) -> u8 {
        self.params.edge_bits
    }

    fn solve(&self, keys: &SipKeys, abort: &(dyn Fn() -> bool + Sync)) -> Vec<Proof> {
        let params = self.params;
        self.pool.install(|| {
            let mut trimmer = EdgeTrimmer::new(keys, &params);
            let mut idle_rounds = 0;
            for round in 0..params.trim_rounds {
                if abort() {
                    return Vec::new();
                }
                if trimmer.trim(round as u64 % 2) == 0 {
                    idle_rounds += 1;
                    if idle_rounds == 2 {
                        break;
                    }
                } else {
                    idle_rounds = 0;
                }
            }
            if abort() {
                return Vec::new();
            }

            let edges = trimmer.survivors();
            log::debug!(
                "{} of {} edges survived trimming",
                edges.len(),
                params.num_edges()
            );
            find_cycles(&edges, params.proof_size)
                .into_iter()
                .map(|nonces| Proof {
                    edge_bits: params.edge_bits,
                    nonces,
                })
                .collect()
        })
    }

    fn verify(&self, keys: &SipKeys, proof: &Proof) -> Result<(), ProofError> {
        verify(keys, proof, &self.params)
    }
}

/// Bitmap of live edges plus the per-round degree counters
struct EdgeTrimmer<'a> {
    keys: &'a SipKeys,
    node_mask: u64,
    alive: Vec<u64>,
    once: Vec<AtomicU64>,
    twice: Vec<AtomicU64>,
}

impl<'a> EdgeTrimmer<'a> {
    fn new(keys: &'a SipKeys, params: &SolverParams) -> Self {
        let words = (params.num_edges() / 64) as usize;
        EdgeTrimmer {
            keys,
            node_mask: params.node_mask(),
            alive: vec![u64::MAX; words],
            once: (0..words).map(|_| AtomicU64::new(0)).collect(),
            twice: (0..words).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Drops every edge whose endpoint on `side` has degree one; returns
    /// the number of edges dropped
    fn trim(&mut self, side: u64) -> u64 {
        let keys = self.keys;
        let mask = self.node_mask;
        let once = &self.once;
        let twice = &self.twice;

        once.par_iter().for_each(|w| w.store(0, Ordering::Relaxed));
        twice.par_iter().for_each(|w| w.store(0, Ordering::Relaxed));

        self.alive.par_iter().enumerate().for_each(|(word, &bits)| {
            for_each_bit(bits, |bit| {
                let node = sipnode(keys, word as u64 * 64 + bit, side, mask);
                let flag = 1u64 << (node & 63);
                let slot = (node >> 6) as usize;
                if once[slot].fetch_or(flag, Ordering::Relaxed) & flag != 0 {
                    twice[slot].fetch_or(flag, Ordering::Relaxed);
                }
            });
        });

        self.alive
            .par_iter_mut()
            .enumerate()
            .map(|(word, bits)| {
                let mut keep = *bits;
                for_each_bit(*bits, |bit| {
                    let node = sipnode(keys, word as u64 * 64 + bit, side, mask);
                    let flag = 1u64 << (node & 63);
                    if twice[(node >> 6) as usize].load(Ordering::Relaxed) & flag == 0 {
                        keep &= !(1u64 << bit);
                    }
                });
                let dropped = (*bits ^ keep).count_ones() as u64;
                *bits = keep;
                dropped
            })
            .sum()
    }

    /// Live edges with their endpoints, as (edge, u, v)
    fn survivors(&self) -> Vec<(u64, u64, u64)> {
        let keys = self.keys;
        let mask = self.node_mask;
        self.alive
            .par_iter()
            .enumerate()
            .flat_map_iter(|(word, &bits)| {
                let mut edges = Vec::with_capacity(bits.count_ones() as usize);
                for_each_bit(bits, |bit| {
                    let edge = word as u64 * 64 + bit;
                    edges.push((edge, sipnode(keys, edge, 0, mask), sipnode(keys, edge, 1, mask)));
                });
                edges
            })
            .collect()
    }
}

#[inline]
fn for_each_bit(mut bits: u64, mut f: impl FnMut(u64)) {
    while bits != 0 {
        f(bits.trailing_zeros() as u64);
        bits &= bits - 1;
    }
}

/// Runs the cuckoo forest over `edges` and returns the sorted edge sets of
/// every detected cycle of exactly `proof_size` edges
///
/// U nodes are tagged `2x`, V nodes `2x + 1`, so both sides share one map.
pub(crate) fn find_cycles(edges: &[(u64, u64, u64)], proof_size: usize) -> Vec<Vec<u64>> {
    let mut parent: HashMap<u64, u64> = HashMap::new();
    let mut links: HashMap<(u64, u64), u64> = HashMap::new();
    let mut cycles = Vec::new();

    for &(edge, u, v) in edges {
        let un = u << 1;
        let vn = (v << 1) | 1;
        let pu = path_to_root(&parent, un);
        let pv = path_to_root(&parent, vn);

        if pu.last() == pv.last() {
            let (mut i, mut j) = (pu.len() - 1, pv.len() - 1);
            while i > 0 && j > 0 && pu[i - 1] == pv[j - 1] {
                i -= 1;
                j -= 1;
            }
            if i + j + 1 == proof_size {
                // un .. join node .. vn, closed by the current edge
                let mut nodes = pu[..=i].to_vec();
                nodes.extend(pv[..j].iter().rev());
                let mut cycle = Vec::with_capacity(proof_size);
                cycle.push(edge);
                cycle.extend(
                    nodes
                        .windows(2)
                        .filter_map(|pair| links.get(&link_key(pair[0], pair[1])).copied()),
                );
                if cycle.len() == proof_size {
                    cycle.sort_unstable();
                    cycles.push(cycle);
                }
            }
            continue;
        }

        if pu.len() < pv.len() {
            reroot(&mut parent, &pu);
            parent.insert(un, vn);
        } else {
            reroot(&mut parent, &pv);
            parent.insert(vn, un);
        }
        links.insert(link_key(un, vn), edge);
    }

    cycles
}

fn path_to_root(parent: &HashMap<u64, u64>, mut node: u64) -> Vec<u64> {
    let mut path = vec![node];
    while let Some(&next) = parent.get(&node) {
        path.push(next);
        node = next;
    }
    path
}

/// Reverses the parent links along `path` so its first node becomes the root
fn reroot(parent: &mut HashMap<u64, u64>, path: &[u64]) {
    for pair in path.windows(2) {
        parent.insert(pair[1], pair[0]);
    }
    parent.remove(&path[0]);
}

fn link_key(a: u64, b: u64) -> (u64, u64) {
    if a < b { (a, b) } else { (b, a) }
}

/// BLAKE2b-256 over the proof's edges packed at `edge_bits` bits each
pub(crate) fn proof_hash(proof: &Proof) -> [u8; 32] {
    let bits = proof.edge_bits as usize;
    let mut packed = vec![0u8; (bits * proof.nonces.len()).div_ceil(8)];
    for (n, &nonce) in proof.nonces.iter().enumerate() {
        for b in 0..bits {
            if (nonce >> b) & 1 == 1 {
                let pos = n * bits + b;
                packed[pos / 8] |= 1 << (pos % 8);
            }
        }
    }
    blake2b_256(&packed)
}
