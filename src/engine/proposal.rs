//! Proposal types and the capability interface workers call into.
//!
//! The decision procedure that turns a local view into colors lives outside
//! the coordination core. Workers only see it through [`Proposer`].

use serde::{Deserialize, Serialize};

use super::{CanvasView, Cell, Rgb};

/// One worker's suggested color for one cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub worker_id: usize,
    pub cell: Cell,
    pub rgb: Rgb,
    /// Nominally in `[0, 1]`. Non-positive values are floored at aggregation.
    pub confidence: f64,
    /// Canvas age observed when the proposal was computed.
    pub version: u64,
}

impl Proposal {
    pub fn new(worker_id: usize, cell: Cell, rgb: Rgb, confidence: f64, version: u64) -> Self {
        Self { worker_id, cell, rgb, confidence, version }
    }
}

/// Per-worker disposition handed to proposers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub worker_id: usize,
    /// How far around the target cell the proposer is meant to look.
    pub fov_radius: usize,
    /// Randomness of the proposer, 0 = deterministic.
    pub temperature: f64,
    pub bias_contrast: f64,
    pub bias_smoothness: f64,
    pub bias_edge: f64,
}

impl WorkerProfile {
    pub fn new(worker_id: usize, fov_radius: usize) -> Self {
        Self {
            worker_id,
            fov_radius,
            temperature: 0.5,
            bias_contrast: 0.5,
            bias_smoothness: 0.5,
            bias_edge: 0.5,
        }
    }
}

/// Everything a proposer gets for one call.
#[derive(Clone, Debug)]
pub struct ProposalRequest<'a> {
    pub profile: &'a WorkerProfile,
    /// Copy of the worker's tile. `view.origin` is the tile origin.
    pub view: &'a CanvasView,
    /// Cell the worker sampled for this iteration.
    pub target: Cell,
    pub version: u64,
}

impl ProposalRequest<'_> {
    #[inline]
    pub fn origin(&self) -> Cell {
        self.view.origin
    }

    /// A proposal for the sampled target, stamped with this request's
    /// worker and version.
    pub fn propose(&self, rgb: Rgb, confidence: f64) -> Proposal {
        Proposal::new(self.profile.worker_id, self.target, rgb, confidence, self.version)
    }
}

/// External capability: local view in, color proposals out.
///
/// Implementations may be slow, nondeterministic or remote, may return no
/// proposals, and may fail. Failures are logged by the worker loop and never
/// escape it.
pub trait Proposer: Send {
    fn name(&self) -> &str {
        "proposer"
    }

    fn propose(&mut self, request: &ProposalRequest<'_>) -> anyhow::Result<Vec<Proposal>>;
}

impl<F> Proposer for F
where
    F: FnMut(&ProposalRequest<'_>) -> anyhow::Result<Vec<Proposal>> + Send,
{
    fn propose(&mut self, request: &ProposalRequest<'_>) -> anyhow::Result<Vec<Proposal>> {
        self(request)
    }
}

/// Builds one proposer per worker at partition time.
pub type ProposerFactory = Box<dyn Fn(&WorkerProfile) -> Box<dyn Proposer> + Send + Sync>;
