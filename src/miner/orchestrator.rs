// src/miner/orchestrator.rs
//! Per-epoch control loop
//!
//! The orchestrator keeps the session alive, asks for work while the job
//! slot is empty and runs the solver against whatever job the slot holds.
//! It runs on a blocking thread and only talks to the network through the
//! outbound queue.
//!
//! Every attempt solves the job present in the slot when the attempt
//! starts. A newer job may arrive while the solver runs; the proofs found
//! are still submitted against the job they were derived from.

use crate::miner::algorithm::Solver;
use crate::miner::job::{Job, JobSlot};
use crate::network::messages::{Request, Submission};
use crate::network::queue::RequestQueue;
use crate::network::supervisor::SessionConfig;
use crate::stats::StatsHandle;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// What the orchestrator did in one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No job in the slot
    Idle,
    /// A solving attempt ran
    Mining,
}

/// Why the orchestrator stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorExit {
    /// The epoch's running flag was cleared; the session should reconnect
    ConnectionLost,
    /// The process is shutting down
    Shutdown,
}

/// Keep-alive and job-request timing for one epoch
#[derive(Debug, Clone)]
pub struct SessionTimers {
    keep_alive_interval: Duration,
    job_request_interval: Duration,
    last_keep_alive: Instant,
    last_job_request: Option<Instant>,
}

impl SessionTimers {
    /// Creates timers for an epoch that started at `started`
    ///
    /// Opening the session counts as activity, so the first keep-alive is
    /// due one interval after `started`. The first job request is due
    /// immediately.
    pub fn new(started: Instant, keep_alive_interval: Duration, job_request_interval: Duration) -> Self {
        SessionTimers {
            keep_alive_interval,
            job_request_interval,
            last_keep_alive: started,
            last_job_request: None,
        }
    }

    /// Returns true, and restarts the timer, when a keep-alive is due at `now`
    pub fn keep_alive_due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_keep_alive) >= self.keep_alive_interval {
            self.last_keep_alive = now;
            true
        } else {
            false
        }
    }

    /// Returns true, and restarts the timer, when a job request is due at `now`
    pub fn job_request_due(&mut self, now: Instant) -> bool {
        let due = match self.last_job_request {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.job_request_interval,
        };
        if due {
            self.last_job_request = Some(now);
        }
        due
    }
}

/// Shared state of the epoch the orchestrator runs in
#[derive(Clone)]
pub struct EpochContext {
    /// Job slot written by the reader
    pub slot: Arc<JobSlot>,
    /// Outbound queue drained by the writer
    pub queue: RequestQueue,
    /// Epoch running flag, a child of `shutdown`
    pub running: CancellationToken,
    /// Process-wide cancellation
    pub shutdown: CancellationToken,
}

/// The per-epoch control loop
pub struct Orchestrator {
    solver: Arc<dyn Solver>,
    epoch: EpochContext,
    timers: SessionTimers,
    idle_poll: Duration,
    stats: StatsHandle,
    rng: StdRng,
}

impl Orchestrator {
    /// Creates the orchestrator for an epoch
    ///
    /// # Arguments
    /// * `solver` - Solving capability shared by every epoch
    /// * `epoch` - Slot, queue and tokens of the current epoch
    /// * `session` - Keep-alive, job-request and idle-poll timing
    /// * `stats` - Receives one report per solving attempt
    /// * `started` - When the epoch began
    pub fn new(
        solver: Arc<dyn Solver>,
        epoch: EpochContext,
        session: &SessionConfig,
        stats: StatsHandle,
        started: Instant,
    ) -> Self {
        Orchestrator {
            solver,
            epoch,
            timers: SessionTimers::new(started, session.keep_alive(), session.job_request()),
            idle_poll: session.idle_poll(),
            stats,
            rng: StdRng::from_entropy(),
        }
    }

    /// Loops until the epoch ends or the process shuts down
    pub fn run(mut self) -> OrchestratorExit {
        loop {
            match self.poll(Instant::now()) {
                ControlFlow::Break(exit) => {
                    log::debug!("Orchestrator stopped: {:?}", exit);
                    return exit;
                }
                ControlFlow::Continue(OrchestratorState::Idle) => std::thread::sleep(self.idle_poll),
                ControlFlow::Continue(OrchestratorState::Mining) => {}
            }
        }
    }

    /// Runs one iteration at time `now`
    ///
    /// # Returns
    /// - `Continue(state)` with what the iteration did
    /// - `Break(exit)` once the loop must stop
    pub fn poll(&mut self, now: Instant) -> ControlFlow<OrchestratorExit, OrchestratorState> {
        if let Some(exit) = self.exit_reason() {
            return ControlFlow::Break(exit);
        }

        if self.timers.keep_alive_due(now) {
            log::debug!("Sending keep-alive");
            self.enqueue(Request::KeepAlive)?;
        }

        let Some(job) = self.epoch.slot.current() else {
            if self.timers.job_request_due(now) {
                log::info!("Job pool is empty, requesting a new job from the node");
                self.enqueue(Request::GetJob)?;
            }
            return ControlFlow::Continue(OrchestratorState::Idle);
        };

        self.mine(&job)?;
        ControlFlow::Continue(OrchestratorState::Mining)
    }

    fn mine(&mut self, job: &Job) -> ControlFlow<OrchestratorExit> {
        let nonce = self.rng.next_u64();
        log::info!(
            "Starting job: {} for height: {}, difficulty: {}, nonce: {}",
            job.id,
            job.height,
            job.difficulty,
            nonce
        );

        let keys = job.seed(nonce);
        let running = self.epoch.running.clone();
        let abort = move || running.is_cancelled();
        let proofs: Vec<_> = self
            .solver
            .solve(&keys, &abort)
            .into_iter()
            .filter(|proof| match self.solver.verify(&keys, proof) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Discarding invalid proof for job {}: {}", job.id, e);
                    false
                }
            })
            .collect();
        self.stats.record_attempt(proofs.len());

        let Some(first) = proofs.first() else {
            return ControlFlow::Continue(());
        };
        log::info!(
            "Found solutions: {}  Hash: {}",
            proofs.len(),
            hex::encode(first.hash())
        );

        for proof in proofs {
            self.enqueue(Request::Submit(Submission {
                edge_bits: self.solver.edge_bits(),
                job_id: job.id,
                height: job.height,
                nonce,
                pow: proof.nonces,
            }))?;
        }
        ControlFlow::Continue(())
    }

    fn enqueue(&self, request: Request) -> ControlFlow<OrchestratorExit> {
        match self.epoch.queue.push(request) {
            Ok(_) => ControlFlow::Continue(()),
            Err(e) => {
                log::warn!("{}", e);
                self.epoch.running.cancel();
                ControlFlow::Break(self.exit_reason().unwrap_or(OrchestratorExit::ConnectionLost))
            }
        }
    }

    fn exit_reason(&self) -> Option<OrchestratorExit> {
        if self.epoch.shutdown.is_cancelled() {
            Some(OrchestratorExit::Shutdown)
        } else if self.epoch.running.is_cancelled() {
            Some(OrchestratorExit::ConnectionLost)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::{Proof, ProofError, SipKeys};
    use crate::network::messages::Envelope;
    use crate::network::queue::{RequestReceiver, request_queue};
    use quickcheck_macros::quickcheck;
    use std::sync::Mutex;

    /// Returns `proofs` fixed proofs per call and records the keys it was given
    ///
    /// The last `invalid` proofs of each call fail verification.
    struct MockSolver {
        calls: Mutex<Vec<SipKeys>>,
        proofs: usize,
        invalid: usize,
    }

    impl Solver for MockSolver {
        fn edge_bits(&self) -> u8 {
            31
        }

        fn solve(&self, keys: &SipKeys, _abort: &(dyn Fn() -> bool + Sync)) -> Vec<Proof> {
            self.calls.lock().unwrap().push(*keys);
            (0..self.proofs)
                .map(|i| Proof {
                    edge_bits: 31,
                    nonces: (0..42).map(|n| n * 10 + i as u64).collect(),
                })
                .collect()
        }

        fn verify(&self, _keys: &SipKeys, proof: &Proof) -> Result<(), ProofError> {
            if proof.nonces[0] as usize >= self.proofs - self.invalid {
                return Err(ProofError::DeadEnd);
            }
            Ok(())
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        solver: Arc<MockSolver>,
        slot: Arc<JobSlot>,
        requests: RequestReceiver,
        attempts: crossbeam_channel::Receiver<u64>,
        running: CancellationToken,
        shutdown: CancellationToken,
        t0: Instant,
    }

    fn fixture(proofs: usize) -> Fixture {
        fixture_with_invalid(proofs, 0)
    }

    fn fixture_with_invalid(proofs: usize, invalid: usize) -> Fixture {
        let solver = Arc::new(MockSolver {
            calls: Mutex::new(Vec::new()),
            proofs,
            invalid,
        });
        let slot = Arc::new(JobSlot::new());
        let (queue, requests) = request_queue();
        let shutdown = CancellationToken::new();
        let running = shutdown.child_token();
        let (share_tx, _) = crossbeam_channel::unbounded();
        let (attempt_tx, attempts) = crossbeam_channel::unbounded();
        let t0 = Instant::now();

        let orchestrator = Orchestrator::new(
            solver.clone(),
            EpochContext {
                slot: slot.clone(),
                queue,
                running: running.clone(),
                shutdown: shutdown.clone(),
            },
            &SessionConfig::default(),
            StatsHandle::new(share_tx, attempt_tx),
            t0,
        );

        Fixture {
            orchestrator,
            solver,
            slot,
            requests,
            attempts,
            running,
            shutdown,
            t0,
        }
    }

    fn drain(requests: &mut RequestReceiver) -> Vec<Envelope> {
        std::iter::from_fn(|| requests.try_pop()).collect()
    }

    fn job_7() -> Job {
        Job {
            id: 7,
            height: 100,
            difficulty: 1,
            pre_pow: vec![0xab; 16],
        }
    }

    #[test]
    fn job_with_one_candidate_yields_one_submission() {
        let mut f = fixture(1);
        f.slot.set(job_7());

        assert_eq!(
            f.orchestrator.poll(f.t0),
            ControlFlow::Continue(OrchestratorState::Mining)
        );

        let sent = drain(&mut f.requests);
        assert_eq!(sent.len(), 1);
        let Request::Submit(submission) = &sent[0].request else {
            panic!("expected a submission, got {}", sent[0].request);
        };
        assert_eq!(submission.job_id, 7);
        assert_eq!(submission.height, 100);
        assert_eq!(submission.edge_bits, 31);
        assert_eq!(submission.pow.len(), 42);

        // the nonce reported is the one the solver's keys were derived from
        let calls = f.solver.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], job_7().seed(submission.nonce));

        assert_eq!(f.attempts.try_recv(), Ok(1));
    }

    #[test]
    fn only_verified_proofs_are_counted_and_submitted() {
        let mut f = fixture_with_invalid(3, 2);
        f.slot.set(job_7());
        let _ = f.orchestrator.poll(f.t0);

        let sent = drain(&mut f.requests);
        assert_eq!(sent.len(), 1);
        let Request::Submit(submission) = &sent[0].request else {
            panic!("expected a submission, got {}", sent[0].request);
        };
        assert_eq!(submission.pow[0], 0);
        assert_eq!(f.attempts.try_recv(), Ok(1));
    }

    #[test]
    fn all_proofs_rejected_submit_nothing() {
        let mut f = fixture_with_invalid(2, 2);
        f.slot.set(job_7());
        let _ = f.orchestrator.poll(f.t0);

        assert!(drain(&mut f.requests).is_empty());
        assert_eq!(f.attempts.try_recv(), Ok(0));
    }

    #[test]
    fn attempts_without_candidates_submit_nothing() {
        let mut f = fixture(0);
        f.slot.set(job_7());
        for i in 0..3 {
            let _ = f.orchestrator.poll(f.t0 + Duration::from_millis(i));
        }
        assert!(drain(&mut f.requests).is_empty());
        assert_eq!(f.solver.calls.lock().unwrap().len(), 3);
        assert_eq!(f.attempts.try_iter().collect::<Vec<_>>(), vec![0, 0, 0]);
    }

    #[test]
    fn ten_idle_seconds_request_two_jobs() {
        let mut f = fixture(1);
        for step in 0..100 {
            let now = f.t0 + Duration::from_millis(100 * step);
            assert_eq!(
                f.orchestrator.poll(now),
                ControlFlow::Continue(OrchestratorState::Idle)
            );
        }

        let sent = drain(&mut f.requests);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|e| e.request == Request::GetJob));
        assert!(f.solver.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn keep_alive_every_twenty_seconds() {
        let mut f = fixture(0);
        f.slot.set(job_7());
        for second in 0..=60 {
            let _ = f.orchestrator.poll(f.t0 + Duration::from_secs(second));
        }
        let keep_alives = drain(&mut f.requests)
            .into_iter()
            .filter(|e| e.request == Request::KeepAlive)
            .count();
        // at 20, 40 and 60 seconds
        assert_eq!(keep_alives, 3);
    }

    #[test]
    fn running_flag_cleared_means_connection_lost() {
        let mut f = fixture(1);
        f.running.cancel();
        assert_eq!(
            f.orchestrator.poll(f.t0),
            ControlFlow::Break(OrchestratorExit::ConnectionLost)
        );
        assert!(drain(&mut f.requests).is_empty());
    }

    #[test]
    fn shutdown_takes_precedence() {
        let mut f = fixture(1);
        f.shutdown.cancel();
        assert!(f.running.is_cancelled());
        assert_eq!(
            f.orchestrator.poll(f.t0),
            ControlFlow::Break(OrchestratorExit::Shutdown)
        );
    }

    #[test]
    fn closed_queue_ends_the_epoch() {
        let mut f = fixture(1);
        drop(f.requests);
        assert_eq!(
            f.orchestrator.poll(f.t0),
            ControlFlow::Break(OrchestratorExit::ConnectionLost)
        );
        assert!(f.running.is_cancelled());
    }

    #[test]
    fn run_exits_within_a_poll_interval_of_cancellation() {
        let f = fixture(0);
        let running = f.running.clone();
        let handle = std::thread::spawn(move || f.orchestrator.run());

        std::thread::sleep(Duration::from_millis(250));
        let cancelled_at = Instant::now();
        running.cancel();
        assert_eq!(handle.join().unwrap(), OrchestratorExit::ConnectionLost);
        assert!(cancelled_at.elapsed() < Duration::from_secs(1));
    }

    #[quickcheck]
    fn keep_alives_never_closer_than_interval(steps: Vec<u16>) -> bool {
        let t0 = Instant::now();
        let interval = Duration::from_secs(20);
        let mut timers = SessionTimers::new(t0, interval, Duration::from_secs(5));

        let mut now = t0;
        let mut last = t0;
        for step in steps {
            now += Duration::from_millis(u64::from(step));
            if timers.keep_alive_due(now) {
                if now.duration_since(last) < interval {
                    return false;
                }
                last = now;
            }
        }
        true
    }

    #[quickcheck]
    fn job_requests_never_closer_than_interval(steps: Vec<u16>) -> bool {
        let t0 = Instant::now();
        let interval = Duration::from_secs(5);
        let mut timers = SessionTimers::new(t0, Duration::from_secs(20), interval);

        let mut now = t0;
        let mut last: Option<Instant> = None;
        for step in steps {
            now += Duration::from_millis(u64::from(step));
            if timers.job_request_due(now) {
                if let Some(last) = last {
                    if now.duration_since(last) < interval {
                        return false;
                    }
                }
                last = Some(now);
            }
        }
        true
    }
}
