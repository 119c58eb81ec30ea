// -----------------------------------------------------------------------------
// Worker loop: sample, read, propose, enqueue
// -----------------------------------------------------------------------------

use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::scheduler::TargetSampler;
use super::stats::SyncCounters;
use super::{Canvas, ProposalQueue, ProposalRequest, Proposer, SyncConfig, TileBounds, WorkerProfile};

#[derive(Clone, Copy, Debug)]
pub(crate) struct WorkerTiming {
    pub(crate) throttle: Duration,
    pub(crate) idle: Duration,
    pub(crate) backoff: Duration,
    pub(crate) empty_log_interval: Duration,
}

impl From<&SyncConfig> for WorkerTiming {
    fn from(config: &SyncConfig) -> Self {
        Self {
            throttle: config.throttle(),
            idle: config.idle(),
            backoff: config.backoff(),
            empty_log_interval: config.empty_log_interval(),
        }
    }
}

/// Result of a single iteration, before the trailing sleep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// Zero-area tile, nothing attempted.
    Idle,
    /// Proposer returned nothing.
    Empty,
    /// This many proposals were enqueued.
    Enqueued(usize),
    /// The queue was closed; this many proposals were dropped.
    Rejected(usize),
    /// The proposer failed or panicked.
    Failed,
}

pub(crate) struct WorkerLoop {
    profile: WorkerProfile,
    bounds: TileBounds,
    proposer: Box<dyn Proposer>,
    sampler: TargetSampler,

    canvas: Arc<Canvas>,
    queue: Arc<ProposalQueue>,
    running: Arc<AtomicBool>,
    counters: Arc<SyncCounters>,
    timing: WorkerTiming,

    // rate limit for "no proposals" log lines
    last_empty_log: Option<Instant>,
    suppressed_empty: u64,
}

impl WorkerLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        profile: WorkerProfile,
        bounds: TileBounds,
        proposer: Box<dyn Proposer>,
        sampler: TargetSampler,
        canvas: Arc<Canvas>,
        queue: Arc<ProposalQueue>,
        running: Arc<AtomicBool>,
        counters: Arc<SyncCounters>,
        timing: WorkerTiming,
    ) -> Self {
        Self {
            profile,
            bounds,
            proposer,
            sampler,
            canvas,
            queue,
            running,
            counters,
            timing,
            last_empty_log: None,
            suppressed_empty: 0,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> usize {
        self.profile.worker_id
    }

    /// One iteration without the trailing sleep.
    pub(crate) fn step(&mut self) -> StepOutcome {
        let Some(target) = self.sampler.sample(&self.bounds) else {
            return StepOutcome::Idle;
        };

        let view = self.canvas.read_bounds(&self.bounds);
        let version = self.canvas.age();
        let request = ProposalRequest { profile: &self.profile, view: &view, target, version };

        // No lock is held here; a slow proposer only stalls this worker.
        let proposer = &mut self.proposer;
        let result = panic::catch_unwind(AssertUnwindSafe(|| proposer.propose(&request)));

        let proposals = match result {
            Ok(Ok(proposals)) => proposals,
            Ok(Err(e)) => {
                SyncCounters::add(&self.counters.proposer_errors, 1);
                warn!(worker = self.id(), proposer = self.proposer.name(), error = %e, "proposal call failed");
                return StepOutcome::Failed;
            }
            Err(_) => {
                SyncCounters::add(&self.counters.proposer_errors, 1);
                warn!(worker = self.id(), proposer = self.proposer.name(), "proposal call panicked");
                return StepOutcome::Failed;
            }
        };

        if proposals.is_empty() {
            SyncCounters::add(&self.counters.empty_rounds, 1);
            self.note_empty();
            return StepOutcome::Empty;
        }

        let n = proposals.len();
        if self.queue.push(proposals) {
            StepOutcome::Enqueued(n)
        } else {
            SyncCounters::add(&self.counters.proposals_rejected, n as u64);
            StepOutcome::Rejected(n)
        }
    }

    fn note_empty(&mut self) {
        let due = self
            .last_empty_log
            .map_or(true, |at| at.elapsed() >= self.timing.empty_log_interval);
        if due {
            debug!(worker = self.id(), suppressed = self.suppressed_empty, "proposer returned no proposals");
            self.last_empty_log = Some(Instant::now());
            self.suppressed_empty = 0;
        } else {
            self.suppressed_empty += 1;
        }
    }

    /// Loop until the running flag is seen cleared at the top of an iteration.
    pub(crate) fn run(mut self) {
        debug!(worker = self.id(), bounds = ?self.bounds, "worker started");
        while self.running.load(Ordering::Acquire) {
            let pause = match self.step() {
                StepOutcome::Idle => self.timing.idle,
                StepOutcome::Failed => self.timing.backoff,
                StepOutcome::Empty | StepOutcome::Enqueued(_) | StepOutcome::Rejected(_) => self.timing.throttle,
            };
            thread::sleep(pause);
        }
        debug!(worker = self.id(), "worker stopped");
    }
}
