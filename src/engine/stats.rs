// -----------------------------------------------------------------------------
// Run counters shared by workers and the aggregator
// -----------------------------------------------------------------------------

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::CanvasError;

#[derive(Default)]
pub(crate) struct SyncCounters {
    pub(crate) cycles: AtomicU64,
    pub(crate) empty_wakes: AtomicU64,
    pub(crate) proposals_received: AtomicU64,
    pub(crate) proposals_applied: AtomicU64,
    pub(crate) proposals_stale: AtomicU64,
    pub(crate) proposals_rejected: AtomicU64,
    pub(crate) cells_written: AtomicU64,
    pub(crate) frames_exported: AtomicU64,
    pub(crate) export_failures: AtomicU64,
    pub(crate) out_of_bounds: AtomicU64,
    pub(crate) proposer_errors: AtomicU64,
    pub(crate) empty_rounds: AtomicU64,
    first_bounds_error: Mutex<Option<String>>,
}

impl SyncCounters {
    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_bounds_errors(&self, errors: &[CanvasError]) {
        if errors.is_empty() {
            return;
        }
        Self::add(&self.out_of_bounds, errors.len() as u64);
        let mut first = self.first_bounds_error.lock();
        if first.is_none() {
            *first = Some(errors[0].to_string());
        }
    }

    pub(crate) fn snapshot(&self, age: u64) -> SyncStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SyncStats {
            age,
            cycles: get(&self.cycles),
            empty_wakes: get(&self.empty_wakes),
            proposals_received: get(&self.proposals_received),
            proposals_applied: get(&self.proposals_applied),
            proposals_stale: get(&self.proposals_stale),
            proposals_rejected: get(&self.proposals_rejected),
            cells_written: get(&self.cells_written),
            frames_exported: get(&self.frames_exported),
            export_failures: get(&self.export_failures),
            out_of_bounds: get(&self.out_of_bounds),
            proposer_errors: get(&self.proposer_errors),
            empty_rounds: get(&self.empty_rounds),
            first_bounds_error: self.first_bounds_error.lock().clone(),
        }
    }
}

/// Point-in-time copy of the run counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub age: u64,
    /// Completed aggregator cycles (one per age increment)
    pub cycles: u64,
    /// Drains that came back empty
    pub empty_wakes: u64,

    pub proposals_received: u64,
    pub proposals_applied: u64,
    /// Dropped for lagging the canvas age past the stale threshold
    pub proposals_stale: u64,
    /// Refused by a closed queue after stop
    pub proposals_rejected: u64,
    pub cells_written: u64,

    pub frames_exported: u64,
    pub export_failures: u64,

    pub out_of_bounds: u64,
    pub first_bounds_error: Option<String>,

    pub proposer_errors: u64,
    /// Proposer calls that returned nothing
    pub empty_rounds: u64,
}
