// -----------------------------------------------------------------------------
// Per-worker target sampling
// -----------------------------------------------------------------------------
use rand::prelude::*;
use rand_pcg::Pcg64Mcg as PcgRng;

use super::{Cell, TileBounds, WorkerProfile};

/// Uniform target-cell sampler, one per worker.
pub(crate) struct TargetSampler {
    rng: PcgRng,
}

impl TargetSampler {
    /// Seeded from the run seed and worker id, so each worker's sequence is
    /// reproducible and distinct from its neighbours'.
    pub(crate) fn new(seed: u64, worker_id: usize) -> Self {
        let state = ((seed as u128) << 64) | (worker_id as u128);
        Self { rng: PcgRng::new(state ^ 0xCAFE_F00D_D15E_A5E5_0000_0000_0000_0001u128) }
    }

    /// Uniform cell in `bounds`, `None` for an empty tile.
    pub(crate) fn sample(&mut self, bounds: &TileBounds) -> Option<Cell> {
        if bounds.is_empty() {
            return None;
        }
        let x = self.rng.gen_range(bounds.x0..bounds.x1);
        let y = self.rng.gen_range(bounds.y0..bounds.y1);
        Some((x, y))
    }

    /// A profile with random stylistic biases.
    pub(crate) fn sample_profile(&mut self, worker_id: usize, fov_radius: usize) -> WorkerProfile {
        WorkerProfile {
            bias_contrast: self.rng.gen::<f64>(),
            bias_smoothness: self.rng.gen::<f64>(),
            bias_edge: self.rng.gen::<f64>(),
            ..WorkerProfile::new(worker_id, fov_radius)
        }
    }
}
