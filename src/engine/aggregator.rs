// -----------------------------------------------------------------------------
// Aggregator: drain, blend, write, advance age, export
// -----------------------------------------------------------------------------
//! The single consumer of the proposal queue and the only writer of the
//! canvas.
//!
//! One cycle drains a batch, groups it by target cell, blends each group by
//! confidence-weighted average, applies every write, advances the age by one
//! and exports a frame. Conflicts are never settled by arrival order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use super::stats::SyncCounters;
use super::{Canvas, Cell, Proposal, ProposalQueue, Rgb, SyncConfig};

/// How a batch is turned into cell colors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendPolicy {
    /// Weight used for non-positive or non-finite confidences.
    pub confidence_floor: f64,
    /// Discard proposals whose version lags the current age by more than this.
    pub stale_threshold: Option<u64>,
}

impl Default for BlendPolicy {
    fn default() -> Self {
        Self { confidence_floor: 0.01, stale_threshold: None }
    }
}

impl BlendPolicy {
    #[inline]
    pub fn effective_confidence(&self, confidence: f64) -> f64 {
        if confidence.is_finite() && confidence > 0.0 {
            confidence
        } else {
            self.confidence_floor
        }
    }

    #[inline]
    pub fn is_stale(&self, version: u64, current_age: u64) -> bool {
        self.stale_threshold
            .is_some_and(|limit| current_age.saturating_sub(version) > limit)
    }
}

/// Writes produced from one batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    /// One entry per distinct cell, sorted by `(y, x)`.
    pub writes: Vec<(Cell, Rgb)>,
    /// Proposals that took part in a blend.
    pub contributing: usize,
    /// Proposals dropped by the stale threshold.
    pub stale: usize,
}

/// Confidence-weighted mean of `(color, confidence)` entries.
///
/// Each channel is `round(Σ c_k·w_k / Σ w_k)` with half-away-from-zero
/// rounding, clamped to `[0, 255]`. `None` when the weights sum to zero.
pub fn blend(entries: &[(Rgb, f64)], policy: &BlendPolicy) -> Option<Rgb> {
    // Scale by the largest weight so huge confidences cannot overflow the sums.
    let max_weight = entries
        .iter()
        .map(|&(_, confidence)| policy.effective_confidence(confidence))
        .fold(0.0f64, f64::max);
    if !(max_weight > 0.0) {
        return None;
    }

    let mut sums = [0.0f64; 3];
    let mut sum_weights = 0.0f64;
    for &(rgb, confidence) in entries {
        let w = policy.effective_confidence(confidence) / max_weight;
        for (s, &c) in sums.iter_mut().zip(rgb.iter()) {
            *s += c as f64 * w;
        }
        sum_weights += w;
    }
    if !(sum_weights > 0.0) {
        return None;
    }
    Some(sums.map(|s| (s / sum_weights).round().clamp(0.0, 255.0) as u8))
}

/// Group a batch by target cell and blend each group.
pub fn resolve_batch(batch: &[Proposal], current_age: u64, policy: &BlendPolicy) -> Resolution {
    let mut stale = 0usize;
    let mut groups: HashMap<Cell, Vec<(Rgb, f64)>> = HashMap::new();
    for p in batch {
        if policy.is_stale(p.version, current_age) {
            stale += 1;
            continue;
        }
        groups.entry(p.cell).or_default().push((p.rgb, p.confidence));
    }
    let contributing = batch.len() - stale;

    let groups: Vec<(Cell, Vec<(Rgb, f64)>)> = groups.into_iter().collect();
    let mut writes: Vec<(Cell, Rgb)> = groups
        .par_iter()
        .filter_map(|(cell, entries)| blend(entries, policy).map(|rgb| (*cell, rgb)))
        .collect();
    writes.sort_unstable_by_key(|&((x, y), _)| (y, x));

    Resolution { writes, contributing, stale }
}

/// What one aggregator iteration did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Stop condition met; the loop should exit.
    Stopped,
    /// Nothing arrived before the wait elapsed.
    Empty,
    /// A batch was applied and the age advanced to `age`.
    Applied { age: u64, cells: usize },
}

pub(crate) struct Aggregator {
    canvas: Arc<Canvas>,
    queue: Arc<ProposalQueue>,
    running: Arc<AtomicBool>,
    // held from the post-drain flag check until the age advances; stop()
    // clears the flag under it
    commit_gate: Arc<Mutex<()>>,
    counters: Arc<SyncCounters>,
    policy: BlendPolicy,
    queue_wait: Duration,
    age_limit: Option<u64>,
    frames_dir: Option<PathBuf>,
    frame_digits: usize,
    // reused as the consumer half of the double buffer
    batch: Vec<Proposal>,
}

impl Aggregator {
    pub(crate) fn new(
        config: &SyncConfig,
        canvas: Arc<Canvas>,
        queue: Arc<ProposalQueue>,
        running: Arc<AtomicBool>,
        commit_gate: Arc<Mutex<()>>,
        counters: Arc<SyncCounters>,
    ) -> Self {
        Self {
            canvas,
            queue,
            running,
            commit_gate,
            counters,
            policy: BlendPolicy {
                confidence_floor: config.confidence_floor,
                stale_threshold: config.stale_threshold,
            },
            queue_wait: config.queue_wait(),
            age_limit: config.age_limit,
            frames_dir: config.frames_dir.clone(),
            frame_digits: config.frame_digits,
            batch: Vec::new(),
        }
    }

    fn limit_reached(&self) -> bool {
        self.age_limit.is_some_and(|limit| self.canvas.age() >= limit)
    }

    /// One cycle: check stop conditions, drain, blend, write, advance, export.
    pub(crate) fn run_cycle(&mut self) -> CycleOutcome {
        if !self.running.load(Ordering::Acquire) {
            return CycleOutcome::Stopped;
        }
        if self.limit_reached() {
            info!(age = self.canvas.age(), "age limit reached, stopping");
            self.running.store(false, Ordering::Release);
            return CycleOutcome::Stopped;
        }

        let n = self.queue.drain_into(&mut self.batch, self.queue_wait);

        // Stop may have landed while we waited; the age must not move after it.
        let commit = self.commit_gate.lock();
        if !self.running.load(Ordering::Acquire) {
            if n > 0 {
                debug!(discarded = n, "stopped during drain, batch not applied");
            }
            self.batch.clear();
            return CycleOutcome::Stopped;
        }
        if n == 0 {
            SyncCounters::add(&self.counters.empty_wakes, 1);
            return CycleOutcome::Empty;
        }
        SyncCounters::add(&self.counters.proposals_received, n as u64);

        let resolution = resolve_batch(&self.batch, self.canvas.age(), &self.policy);
        self.batch.clear();

        let rejected = self.canvas.write_many(&resolution.writes);
        if !rejected.is_empty() {
            error!(count = rejected.len(), first = %rejected[0], "out-of-range proposals rejected");
        }
        self.counters.record_bounds_errors(&rejected);

        let cells = resolution.writes.len() - rejected.len();
        SyncCounters::add(&self.counters.proposals_applied, resolution.contributing as u64);
        SyncCounters::add(&self.counters.proposals_stale, resolution.stale as u64);
        SyncCounters::add(&self.counters.cells_written, cells as u64);

        let age = self.canvas.increment_age();
        drop(commit);
        SyncCounters::add(&self.counters.cycles, 1);
        debug!(age, proposals = n, cells, stale = resolution.stale, "cycle applied");

        self.export_frame(age);

        CycleOutcome::Applied { age, cells }
    }

    fn export_frame(&self, age: u64) {
        let Some(dir) = &self.frames_dir else { return };
        match self.canvas.export_frame(dir, age, self.frame_digits) {
            Ok(path) => {
                SyncCounters::add(&self.counters.frames_exported, 1);
                debug!(age, path = %path.display(), "frame exported");
            }
            Err(e) => {
                SyncCounters::add(&self.counters.export_failures, 1);
                warn!(age, error = %e, "frame export failed");
            }
        }
    }

    /// Cycle until a stop condition, then close the queue and join workers.
    pub(crate) fn run(mut self, workers: Vec<thread::JoinHandle<()>>) {
        info!(workers = workers.len(), "aggregator started");
        while self.run_cycle() != CycleOutcome::Stopped {}

        self.running.store(false, Ordering::Release);
        self.queue.close();

        for handle in workers {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "worker thread panicked");
            }
        }
        info!(age = self.canvas.age(), "aggregator stopped");
    }
}
