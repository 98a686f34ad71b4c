// src/main.rs
use clap::Parser;
use cuckatoo_miner_rs::miner::algorithm::SipKeys;
use cuckatoo_miner_rs::network::Request;
use cuckatoo_miner_rs::utils::init_bench_logging;
use cuckatoo_miner_rs::{self, *};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Main entry point for the Cuckatoo miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Starts the mining session with given options
///
/// # Arguments
/// * `opts` - Command line options for mining operation
///
/// # Operations
/// 1. Initializes logging
/// 2. Resolves and validates configuration (nothing connects on error)
/// 3. Creates the solver and starts statistics reporting
/// 4. Installs the Ctrl+C handler
/// 5. Runs the session supervisor until cancelled
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let config = Config::resolve(&opts)?;
    let node = config
        .node
        .clone()
        .ok_or_else(|| MinerError::ConfigError("No node configured".to_string()))?;
    let endpoint = node.endpoint()?;
    let threads = config.threads();

    log::info!("Node: {}", endpoint);
    log::info!("Login: {}", node.login);
    log::info!("Algorithm: {} ({} solver threads)", config.algorithm, threads);

    let solver = create_solver(config.algorithm, threads)?;

    // Statistics reporting
    let reporter = StatsReporter::new(Duration::from_secs(config.stats.interval_secs));
    reporter.start_reporting();

    let login = Request::Login {
        login: node.login,
        password: node.password,
        agent: format!("cuckatoo_miner-rs/{}", env!("CARGO_PKG_VERSION")),
    };
    let supervisor = Supervisor::new(
        TcpConnector::new(config.session.connect_timeout()),
        endpoint,
        login,
        solver,
        config.session.clone(),
        reporter.handle(),
    );

    // Runtime setup
    let rt = Runtime::new()?;
    rt.block_on(async {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("Exiting the miner, please wait...");
                    token.cancel();
                }
                Err(e) => log::error!("Unable to listen for Ctrl+C: {}", e),
            }
        });

        supervisor.run(shutdown).await
    })
}

/// Runs solver benchmarks on random graphs
///
/// # Arguments
/// * `opts` - Benchmark configuration options
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Creates the solver for the requested variant
/// 3. Solves graphs with random keys until the duration elapses
/// 4. Reports graph rate and solutions found
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let solver = create_solver(opts.algorithm, opts.threads)?;
    let reporter = StatsReporter::new(Duration::from_secs(5));
    reporter.start_reporting();
    let stats = reporter.handle();

    log::info!(
        "Starting {} benchmark for {} seconds on {} threads",
        opts.algorithm,
        opts.duration,
        opts.threads
    );

    let start_time = Instant::now();
    let deadline = Duration::from_secs(opts.duration);
    let expired = move || start_time.elapsed() >= deadline;
    let mut rng = StdRng::from_entropy();
    let mut graphs = 0u64;
    let mut solutions = 0u64;

    while !expired() {
        let keys: SipKeys = std::array::from_fn(|_| rng.next_u64());
        let graph_start = Instant::now();
        let proofs = solver.solve(&keys, &expired);
        if expired() && proofs.is_empty() {
            // interrupted mid-graph
            break;
        }

        graphs += 1;
        solutions += proofs.len() as u64;
        stats.record_attempt(proofs.len());
        log::debug!(
            "Graph {} searched in {:.2}s, {} solutions",
            graphs,
            graph_start.elapsed().as_secs_f64(),
            proofs.len()
        );
    }

    // Report final results
    let elapsed = start_time.elapsed().as_secs_f64();
    log::info!("Benchmark results:");
    log::info!("Total graphs: {}", graphs);
    log::info!("Solutions found: {}", solutions);
    log::info!("Average graph rate: {:.3} g/s", graphs as f64 / elapsed.max(f64::EPSILON));
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let config = config::generate_template();
    std::fs::write(opts.output, config)?;
    Ok(())
}
