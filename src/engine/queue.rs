// -----------------------------------------------------------------------------
// Proposal queue: many workers push, the aggregator swaps out whole batches
// -----------------------------------------------------------------------------
//! Double-buffered MPSC queue.
//!
//! Producers append under the lock and signal the condvar. The consumer
//! hands in its (empty) spare buffer and swaps it with the live one, so
//! every critical section is O(1) in the batch size and a proposal is seen
//! by exactly one drain.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::Proposal;

#[derive(Default)]
struct QueueState {
    pending: Vec<Proposal>,
    closed: bool,
}

#[derive(Default)]
pub struct ProposalQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl ProposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a worker's proposals and wake the consumer.
    ///
    /// Returns `false` (dropping the proposals) once the queue is closed.
    pub fn push(&self, mut proposals: Vec<Proposal>) -> bool {
        if proposals.is_empty() {
            return true;
        }
        {
            let mut s = self.state.lock();
            if s.closed {
                return false;
            }
            s.pending.append(&mut proposals);
        }
        self.ready.notify_one();
        true
    }

    /// Wait up to `timeout` for proposals, then swap the live buffer into
    /// `batch`.
    ///
    /// `batch` is cleared first and receives everything enqueued before the
    /// swap. Returns the batch size; zero on timeout or when closed and empty.
    pub fn drain_into(&self, batch: &mut Vec<Proposal>, timeout: Duration) -> usize {
        batch.clear();
        let mut s = self.state.lock();
        if s.pending.is_empty() && !s.closed {
            self.ready
                .wait_while_for(&mut s, |s| s.pending.is_empty() && !s.closed, timeout);
        }
        std::mem::swap(&mut s.pending, batch);
        batch.len()
    }

    /// Reject all further pushes and wake a waiting consumer.
    ///
    /// Proposals already queued stay until the next drain.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
