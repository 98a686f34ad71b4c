// src/network/supervisor.rs
//! Session supervisor
//!
//! Owns the connection lifecycle. Each successful connect starts an epoch:
//! a reader task, a writer task and the orchestrator, all bound to a
//! running token derived from the process token. When any of them ends the
//! epoch, the others are stopped and joined before the next connect.

use crate::miner::algorithm::Solver;
use crate::miner::job::JobSlot;
use crate::miner::orchestrator::{EpochContext, Orchestrator, OrchestratorExit};
use crate::network::messages::Request;
use crate::network::node::Endpoint;
use crate::network::pending::PendingRequests;
use crate::network::queue::request_queue;
use crate::network::reader::ReaderTask;
use crate::network::transport::Connector;
use crate::network::writer::WriterTask;
use crate::stats::StatsHandle;
use crate::utils::error::{MinerError, MinerResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Session timing, read from the `[session]` table of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wait between failed connect attempts, in seconds
    pub reconnect_backoff_secs: u64,
    /// Interval between keep-alive requests, in seconds
    pub keep_alive_secs: u64,
    /// Minimum interval between job requests while idle, in seconds
    pub job_request_secs: u64,
    /// Sleep between orchestrator iterations without a job, in milliseconds
    pub idle_poll_ms: u64,
    /// Bound on a single read wait or write, in seconds
    pub io_timeout_secs: u64,
    /// Bound on establishing a connection, in seconds
    pub connect_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            reconnect_backoff_secs: 30,
            keep_alive_secs: 20,
            job_request_secs: 5,
            idle_poll_ms: 100,
            io_timeout_secs: 5,
            connect_timeout_secs: 10,
        }
    }
}

impl SessionConfig {
    /// Wait between failed connect attempts
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    /// Interval between keep-alive requests
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Minimum interval between job requests
    pub fn job_request(&self) -> Duration {
        Duration::from_secs(self.job_request_secs)
    }

    /// Orchestrator sleep while idle
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Read and write bound
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    /// Connect bound
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Checks that every interval is usable
    ///
    /// # Errors
    /// Returns `MinerError::ConfigError` naming the first zero interval.
    pub fn validate(&self) -> Result<(), MinerError> {
        let fields = [
            ("reconnect_backoff_secs", self.reconnect_backoff_secs),
            ("keep_alive_secs", self.keep_alive_secs),
            ("job_request_secs", self.job_request_secs),
            ("idle_poll_ms", self.idle_poll_ms),
            ("io_timeout_secs", self.io_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(MinerError::ConfigError(format!(
                "session.{} must be greater than zero",
                name
            ))),
            None => Ok(()),
        }
    }
}

/// Runs mining sessions against one node until cancelled
pub struct Supervisor<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    login: Request,
    solver: Arc<dyn Solver>,
    session: SessionConfig,
    stats: StatsHandle,
}

impl<C: Connector> Supervisor<C> {
    /// Creates a supervisor
    ///
    /// # Arguments
    /// * `connector` - Opens connections to `endpoint`
    /// * `endpoint` - Node address
    /// * `login` - Request sent first in every epoch
    /// * `solver` - Solving capability shared by every epoch
    /// * `session` - Timing settings
    /// * `stats` - Receives attempts and submission verdicts
    pub fn new(
        connector: C,
        endpoint: Endpoint,
        login: Request,
        solver: Arc<dyn Solver>,
        session: SessionConfig,
        stats: StatsHandle,
    ) -> Self {
        Supervisor {
            connector,
            endpoint,
            login,
            solver,
            session,
            stats,
        }
    }

    /// Connects, mines and reconnects until `shutdown` is cancelled
    ///
    /// Connect failures are retried after the backoff forever.
    ///
    /// # Errors
    /// Returns `MinerError::TaskError` if an epoch task panicked.
    pub async fn run(&self, shutdown: CancellationToken) -> MinerResult<()> {
        let backoff = self.session.reconnect_backoff();

        while !shutdown.is_cancelled() {
            log::info!("Connecting to node {}", self.endpoint);
            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                connected = self.connector.connect(&self.endpoint) => connected,
            };

            let (reader, writer) = match connected {
                Ok(halves) => halves,
                Err(e) => {
                    log::error!("{}. Retrying in {} seconds", e, backoff.as_secs());
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = time::sleep(backoff) => continue,
                    }
                }
            };

            log::info!("Connected to node {}", self.endpoint);
            match self.run_epoch(reader, writer, &shutdown).await? {
                OrchestratorExit::Shutdown => break,
                OrchestratorExit::ConnectionLost => {
                    log::warn!("Connection to node {} lost, reconnecting", self.endpoint)
                }
            }
        }

        log::info!("Session stopped");
        Ok(())
    }

    /// Runs one connect-to-disconnect lifetime
    ///
    /// Returns only after the reader, writer and orchestrator have all
    /// finished; the transport halves are dropped with their tasks.
    async fn run_epoch(
        &self,
        reader: C::Reader,
        writer: C::Writer,
        shutdown: &CancellationToken,
    ) -> MinerResult<OrchestratorExit> {
        let running = shutdown.child_token();
        let slot = Arc::new(JobSlot::new());
        let pending = PendingRequests::new();
        let (queue, requests) = request_queue();
        let io_timeout = self.session.io_timeout();

        let reader_task = tokio::spawn(
            ReaderTask::new(
                slot.clone(),
                pending.clone(),
                self.stats.clone(),
                running.clone(),
                io_timeout,
            )
            .run(reader),
        );
        let writer_task = tokio::spawn(
            WriterTask::new(pending, running.clone(), io_timeout).run(writer, requests),
        );

        if let Err(e) = queue.push(self.login.clone()) {
            log::warn!("Could not queue login: {}", e);
        }

        let orchestrator = Orchestrator::new(
            self.solver.clone(),
            EpochContext {
                slot,
                queue,
                running: running.clone(),
                shutdown: shutdown.clone(),
            },
            &self.session,
            self.stats.clone(),
            Instant::now(),
        );
        let exit = tokio::task::spawn_blocking(move || orchestrator.run()).await;

        running.cancel();
        let reader_done = reader_task.await;
        let writer_done = writer_task.await;

        let exit = exit?;
        reader_done?;
        writer_done?;
        Ok(exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::{Proof, ProofError, SipKeys};
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, ReadHalf, WriteHalf, duplex, split};
    use tokio::sync::mpsc;

    struct NoSolutions;

    impl Solver for NoSolutions {
        fn edge_bits(&self) -> u8 {
            31
        }

        fn solve(&self, _keys: &SipKeys, _abort: &(dyn Fn() -> bool + Sync)) -> Vec<Proof> {
            Vec::new()
        }

        fn verify(&self, _keys: &SipKeys, _proof: &Proof) -> Result<(), ProofError> {
            Ok(())
        }
    }

    /// Refuses every connection, cancelling after `limit` attempts
    struct Refusing {
        attempts: Arc<Mutex<Vec<time::Instant>>>,
        limit: usize,
        shutdown: CancellationToken,
    }

    impl Connector for Refusing {
        type Reader = ReadHalf<DuplexStream>;
        type Writer = WriteHalf<DuplexStream>;

        async fn connect(&self, endpoint: &Endpoint) -> MinerResult<(Self::Reader, Self::Writer)> {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(time::Instant::now());
            if attempts.len() >= self.limit {
                self.shutdown.cancel();
            }
            Err(MinerError::ConnectionError(format!("{} refused", endpoint)))
        }
    }

    /// Hands the node side of every new in-memory connection to the test
    struct InMemory {
        nodes: mpsc::UnboundedSender<DuplexStream>,
    }

    impl Connector for InMemory {
        type Reader = ReadHalf<DuplexStream>;
        type Writer = WriteHalf<DuplexStream>;

        async fn connect(&self, _endpoint: &Endpoint) -> MinerResult<(Self::Reader, Self::Writer)> {
            let (client, node) = duplex(64 * 1024);
            self.nodes
                .send(node)
                .map_err(|_| MinerError::ConnectionError("test node gone".into()))?;
            Ok(split(client))
        }
    }

    fn supervisor<C: Connector>(connector: C, session: SessionConfig) -> Supervisor<C> {
        Supervisor::new(
            connector,
            "127.0.0.1:3416".parse().unwrap(),
            Request::Login {
                login: "tester".into(),
                password: None,
                agent: "test".into(),
            },
            Arc::new(NoSolutions),
            session,
            StatsHandle::detached(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_are_retried_after_backoff() {
        let shutdown = CancellationToken::new();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let connector = Refusing {
            attempts: attempts.clone(),
            limit: 3,
            shutdown: shutdown.clone(),
        };

        supervisor(connector, SessionConfig::default())
            .run(shutdown)
            .await
            .unwrap();

        let attempts = attempts.lock().unwrap();
        assert_eq!(attempts.len(), 3);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(30));
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let shutdown = CancellationToken::new();
        let connector = Refusing {
            attempts: Arc::new(Mutex::new(Vec::new())),
            limit: usize::MAX,
            shutdown: shutdown.clone(),
        };
        let session = SessionConfig {
            reconnect_backoff_secs: 3600,
            ..SessionConfig::default()
        };

        let token = shutdown.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        time::timeout(Duration::from_secs(5), supervisor(connector, session).run(shutdown))
            .await
            .expect("supervisor should stop on cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn read_failure_starts_a_new_epoch() {
        let (nodes_tx, mut nodes) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let session = SessionConfig {
            idle_poll_ms: 10,
            io_timeout_secs: 1,
            ..SessionConfig::default()
        };
        let supervisor = supervisor(InMemory { nodes: nodes_tx }, session);
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { supervisor.run(shutdown).await }
        });

        let first = nodes.recv().await.unwrap();
        let (node_read, _node_write) = split(first);
        let mut lines = BufReader::new(node_read).lines();
        let login: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(login["method"], "login");
        let getjob: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(getjob["method"], "getjobtemplate");

        // the node goes away mid-epoch
        drop(lines);
        drop(_node_write);

        let second = time::timeout(Duration::from_secs(5), nodes.recv())
            .await
            .expect("supervisor should reconnect")
            .unwrap();
        let mut lines = BufReader::new(second).lines();
        let login: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(login["method"], "login");
        assert_eq!(login["id"], "0");

        shutdown.cancel();
        time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor should stop on cancellation")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_mid_epoch_stops_without_reconnecting() {
        let (nodes_tx, mut nodes) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let session = SessionConfig {
            idle_poll_ms: 10,
            io_timeout_secs: 1,
            ..SessionConfig::default()
        };
        let supervisor = supervisor(InMemory { nodes: nodes_tx }, session);
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { supervisor.run(shutdown).await }
        });

        // keep the node side open so the epoch is still live when cancelled
        let node = nodes.recv().await.unwrap();
        let mut lines = BufReader::new(node).lines();
        let login: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(login["method"], "login");

        shutdown.cancel();
        time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor should stop on cancellation")
            .unwrap()
            .unwrap();

        assert!(nodes.try_recv().is_err());
        drop(lines);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        assert!(SessionConfig::default().validate().is_ok());
        let session = SessionConfig {
            idle_poll_ms: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(session.validate(), Err(MinerError::ConfigError(_))));
    }
}
