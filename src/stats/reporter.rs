// src/stats/reporter.rs
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{Components, System};

/// Statistics related to mining performance
#[derive(Debug, Clone, Default)]
pub struct MiningStats {
    /// Total number of graphs searched
    pub graphs_total: u64,
    /// Number of cycles found by the solver
    pub solutions_found: u64,
    /// Number of submissions accepted by the node
    pub shares_accepted: u64,
    /// Number of submissions rejected by the node
    pub shares_rejected: u64,
    /// Average graph rate since start (graphs per second)
    pub graph_rate: f64,
}

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently in use on the host (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius
    pub temperature: f32,
}

/// Collects and reports mining and hardware statistics
pub struct StatsReporter {
    /// Atomic counters for mining statistics
    stats: Arc<MiningStatsAtomic>,
    /// System information collector
    system: System,
    /// Hardware component information collector
    components: Components,
    /// Interval at which stats are reported
    report_interval: Duration,
}

/// Atomic version of MiningStats for thread-safe operations
struct MiningStatsAtomic {
    graphs: AtomicU64,
    solutions: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    start_time: Instant,
}

/// Sending side of the reporter, handed to the mining session
///
/// Sends never block and are silently dropped once the reporter is gone.
#[derive(Clone)]
pub struct StatsHandle {
    shares: Sender<ShareResult>,
    attempts: Sender<u64>,
}

impl StatsHandle {
    /// Wraps existing channels
    ///
    /// # Arguments
    /// * `shares` - Receives one [`ShareResult`] per answered submission
    /// * `attempts` - Receives the number of solutions found per graph
    pub fn new(shares: Sender<ShareResult>, attempts: Sender<u64>) -> Self {
        StatsHandle { shares, attempts }
    }

    /// A handle whose reports go nowhere
    pub fn detached() -> Self {
        let (shares, _) = crossbeam_channel::unbounded();
        let (attempts, _) = crossbeam_channel::unbounded();
        StatsHandle { shares, attempts }
    }

    /// Records the node's verdict on a submission
    pub fn record_share(&self, result: ShareResult) {
        let _ = self.shares.send(result);
    }

    /// Records one searched graph and the solutions it produced
    pub fn record_attempt(&self, solutions: usize) {
        let _ = self.attempts.send(solutions as u64);
    }
}

impl StatsReporter {
    /// Creates a new StatsReporter with the specified reporting interval
    ///
    /// # Arguments
    /// * `report_interval` - How often to log statistics
    pub fn new(report_interval: Duration) -> Self {
        StatsReporter {
            stats: Arc::new(MiningStatsAtomic {
                graphs: AtomicU64::new(0),
                solutions: AtomicU64::new(0),
                accepted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
            report_interval,
        }
    }

    /// Creates and returns a channel sender for share results
    ///
    /// The returned sender can be used to report accepted/rejected submissions.
    /// The reporter will automatically listen for these events on a background thread.
    pub fn share_sender(&self) -> Sender<ShareResult> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.start_share_listener(rx);
        tx
    }

    /// Creates and returns a channel sender for solving attempts
    ///
    /// Each message counts one graph; its value is the number of solutions
    /// found in it.
    pub fn attempt_sender(&self) -> Sender<u64> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.start_attempt_listener(rx);
        tx
    }

    /// Creates a [`StatsHandle`] feeding this reporter
    pub fn handle(&self) -> StatsHandle {
        StatsHandle::new(self.share_sender(), self.attempt_sender())
    }

    /// Gets the current mining statistics
    ///
    /// # Returns
    /// A snapshot of the current mining statistics
    pub fn get_stats(&self) -> MiningStats {
        let total_seconds = self.stats.start_time.elapsed().as_secs_f64();
        let graphs = self.stats.graphs.load(Ordering::Relaxed);

        MiningStats {
            graphs_total: graphs,
            solutions_found: self.stats.solutions.load(Ordering::Relaxed),
            shares_accepted: self.stats.accepted.load(Ordering::Relaxed),
            shares_rejected: self.stats.rejected.load(Ordering::Relaxed),
            graph_rate: if total_seconds > 0.0 {
                graphs as f64 / total_seconds
            } else {
                0.0
            },
        }
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    ///
    /// # Returns
    /// A snapshot of the current hardware statistics
    pub fn get_hardware_stats(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }

    /// Starts the periodic reporting of statistics
    ///
    /// This spawns a background thread that logs stats at the configured interval.
    pub fn start_reporting(&self) {
        let stats = self.stats.clone();
        let interval = self.report_interval;

        std::thread::spawn(move || {
            let mut reporter = StatsReporter {
                stats,
                system: System::new_all(),
                components: Components::new_with_refreshed_list(),
                report_interval: interval,
            };

            loop {
                std::thread::sleep(interval);
                let mining_stats = reporter.get_stats();
                let hw_stats = reporter.get_hardware_stats();

                log::info!(
                    "Graphs: {} ({:.3} g/s) | Solutions: {} | Accepted/Rejected: {}/{} | CPU: {:.1}% | Mem: {} MiB | Temp: {:.1}°C",
                    mining_stats.graphs_total,
                    mining_stats.graph_rate,
                    mining_stats.solutions_found,
                    mining_stats.shares_accepted,
                    mining_stats.shares_rejected,
                    hw_stats.cpu_usage,
                    hw_stats.memory_used / (1024 * 1024),
                    hw_stats.temperature
                );
            }
        });
    }

    /// Starts a listener for share results on a background thread
    fn start_share_listener(&self, receiver: Receiver<ShareResult>) {
        let stats = self.stats.clone();

        std::thread::spawn(move || {
            for result in receiver {
                match result {
                    ShareResult::Accepted => stats.accepted.fetch_add(1, Ordering::Relaxed),
                    ShareResult::Rejected => stats.rejected.fetch_add(1, Ordering::Relaxed),
                };
            }
        });
    }

    /// Starts a listener for solving attempts on a background thread
    fn start_attempt_listener(&self, receiver: Receiver<u64>) {
        let stats = self.stats.clone();

        std::thread::spawn(move || {
            for solutions in receiver {
                stats.graphs.fetch_add(1, Ordering::Relaxed);
                stats.solutions.fetch_add(solutions, Ordering::Relaxed);
            }
        });
    }
}

/// Node verdict on a submitted solution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareResult {
    /// The solution was accepted
    Accepted,
    /// The solution was rejected (stale job, low difficulty, invalid proof)
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for(reporter: &StatsReporter, done: impl Fn(&MiningStats) -> bool) -> MiningStats {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let stats = reporter.get_stats();
            if done(&stats) || Instant::now() > deadline {
                return stats;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn counts_attempts_and_solutions() {
        let reporter = StatsReporter::new(Duration::from_secs(60));
        let handle = reporter.handle();
        handle.record_attempt(0);
        handle.record_attempt(2);
        handle.record_attempt(1);

        let stats = wait_for(&reporter, |s| s.graphs_total == 3);
        assert_eq!(stats.graphs_total, 3);
        assert_eq!(stats.solutions_found, 3);
    }

    #[test]
    fn counts_share_verdicts() {
        let reporter = StatsReporter::new(Duration::from_secs(60));
        let handle = reporter.handle();
        handle.record_share(ShareResult::Accepted);
        handle.record_share(ShareResult::Rejected);
        handle.record_share(ShareResult::Accepted);

        let stats = wait_for(&reporter, |s| s.shares_accepted + s.shares_rejected == 3);
        assert_eq!(stats.shares_accepted, 2);
        assert_eq!(stats.shares_rejected, 1);
    }

    #[test]
    fn detached_handle_ignores_reports() {
        let handle = StatsHandle::detached();
        handle.record_attempt(1);
        handle.record_share(ShareResult::Rejected);
    }
}
