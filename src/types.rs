// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported Cuckatoo proof-of-work variants
///
/// The variant fixes the size of the graph the solver searches: a CuckatooN
/// graph has 2^N edges and 2^N nodes on each side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmType {
    /// Cuckatoo31 (2^31 edges)
    #[clap(name = "c31")]
    C31,

    /// Cuckatoo32 (2^32 edges)
    #[clap(name = "c32")]
    C32,
}

impl AlgorithmType {
    /// Number of edge bits for this variant, as reported in submissions
    pub fn edge_bits(&self) -> u8 {
        match self {
            AlgorithmType::C31 => 31,
            AlgorithmType::C32 => 32,
        }
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmType::C31 => write!(f, "c31"),
            AlgorithmType::C32 => write!(f, "c32"),
        }
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c31" | "cuckatoo31" => Ok(AlgorithmType::C31),
            "c32" | "cuckatoo32" => Ok(AlgorithmType::C32),
            _ => Err(format!("Invalid algorithm {}. Must be C31 or C32.", s)),
        }
    }
}
