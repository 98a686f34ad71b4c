// src/cli/commands.rs
use crate::types::AlgorithmType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cuckatoo Miner CLI - C31/C32 proof-of-work mining client in Rust
#[derive(Parser, Debug)]
#[command(name = "cuckatoo-miner-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (start mining, run benchmarks, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Start mining against a node
    Start(StartOptions),

    /// Run solver benchmarks on random graphs
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
///
/// Every flag overrides the matching setting of the config file.
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Node address in <host:port> format
    #[arg(short, long)]
    pub node: Option<String>,

    /// Login sent to the node
    #[arg(short, long)]
    pub login: Option<String>,

    /// Password sent with the login
    #[arg(short, long)]
    pub pass: Option<String>,

    /// Cuckatoo variant to mine
    #[arg(short, long)]
    pub algorithm: Option<AlgorithmType>,

    /// Number of solver threads (0 = number of CPU cores)
    #[arg(short, long)]
    pub threads: Option<usize>,
}

/// Options for running solver benchmarks
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Algorithm to benchmark
    #[arg(short, long)]
    pub algorithm: AlgorithmType,

    /// Duration of benchmark in seconds
    #[arg(short, long, default_value_t = 60)]
    pub duration: u64,

    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}
