// -----------------------------------------------------------------------------
// Reference proposer: local neighbourhood blend with jitter
// -----------------------------------------------------------------------------
use rand::prelude::*;
use rand_pcg::Pcg64Mcg as PcgRng;

use super::{CanvasView, Proposal, ProposalRequest, Proposer, Rgb, WorkerProfile};

/// Largest per-channel jitter at temperature 1.0.
const MAX_JITTER: f64 = 48.0;

/// Mean and mean per-channel standard deviation of the cells within
/// `radius` of `(x, y)` that the view covers.
pub fn neighborhood_stats(view: &CanvasView, x: usize, y: usize, radius: usize) -> Option<([f64; 3], f64)> {
    let bounds = view.bounds();
    let x0 = x.saturating_sub(radius).max(bounds.x0);
    let y0 = y.saturating_sub(radius).max(bounds.y0);
    let x1 = (x + radius + 1).min(bounds.x1);
    let y1 = (y + radius + 1).min(bounds.y1);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    let mut n = 0.0f64;
    for yy in y0..y1 {
        for xx in x0..x1 {
            let Some(px) = view.get_abs(xx, yy) else { continue };
            for c in 0..3 {
                let v = px[c] as f64;
                sum[c] += v;
                sum_sq[c] += v * v;
            }
            n += 1.0;
        }
    }
    if n == 0.0 {
        return None;
    }

    let mean = sum.map(|s| s / n);
    let std = (0..3)
        .map(|c| (sum_sq[c] / n - mean[c] * mean[c]).max(0.0).sqrt())
        .sum::<f64>()
        / 3.0;
    Some((mean, std))
}

/// Proposes the local mean around the target, pushed by the worker's
/// contrast bias and perturbed by its temperature.
///
/// Confidence is high in uniform neighbourhoods and falls with local
/// variation, scaled by the smoothness bias.
pub struct NeighborhoodProposer {
    rng: PcgRng,
}

impl NeighborhoodProposer {
    pub fn new(seed: u64, profile: &WorkerProfile) -> Self {
        let state = ((seed as u128) << 64) ^ ((profile.worker_id as u128) << 1) ^ 0x9E37_79B9_7F4A_7C15;
        Self { rng: PcgRng::new(state) }
    }

    fn jitter(&mut self, temperature: f64) -> f64 {
        if temperature <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-1.0..=1.0) * MAX_JITTER * temperature.min(1.0)
    }
}

impl Proposer for NeighborhoodProposer {
    fn name(&self) -> &str {
        "neighborhood"
    }

    fn propose(&mut self, request: &ProposalRequest<'_>) -> anyhow::Result<Vec<Proposal>> {
        let profile = request.profile;
        let (x, y) = request.target;
        let Some((mean, std)) = neighborhood_stats(request.view, x, y, profile.fov_radius) else {
            return Ok(Vec::new());
        };

        let contrast = 1.0 + 0.5 * profile.bias_contrast;
        let mut rgb: Rgb = [0; 3];
        for c in 0..3 {
            let pushed = 127.5 + (mean[c] - 127.5) * contrast;
            let v = pushed + self.jitter(profile.temperature);
            rgb[c] = v.round().clamp(0.0, 255.0) as u8;
        }

        let spread = std / (16.0 + 48.0 * profile.bias_smoothness);
        let confidence = (1.0 / (1.0 + spread)).clamp(0.0, 1.0);

        Ok(vec![request.propose(rgb, confidence)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_view(w: usize, h: usize, rgb: Rgb) -> CanvasView {
        CanvasView { origin: (0, 0), width: w, height: h, pixels: vec![rgb; w * h] }
    }

    #[test]
    fn test_stats_of_uniform_view() {
        let view = uniform_view(5, 5, [10, 20, 30]);
        let (mean, std) = neighborhood_stats(&view, 2, 2, 1).unwrap();
        assert_eq!(mean, [10.0, 20.0, 30.0]);
        assert!(std.abs() < 1e-9);
    }

    #[test]
    fn test_stats_clip_to_view() {
        let mut view = uniform_view(3, 3, [0, 0, 0]);
        view.origin = (10, 10);
        assert!(neighborhood_stats(&view, 10, 10, 1).is_some());
        assert!(neighborhood_stats(&view, 0, 0, 1).is_none());
    }

    #[test]
    fn test_cold_neutral_worker_reproduces_uniform_color() {
        let profile = WorkerProfile { temperature: 0.0, bias_contrast: 0.0, ..WorkerProfile::new(0, 2) };
        let view = uniform_view(6, 6, [40, 80, 120]);
        let request = ProposalRequest { profile: &profile, view: &view, target: (3, 3), version: 5 };

        let mut proposer = NeighborhoodProposer::new(1, &profile);
        let out = proposer.propose(&request).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rgb, [40, 80, 120]);
        assert_eq!(out[0].cell, (3, 3));
        assert_eq!(out[0].version, 5);
        assert!((out[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_noisy_neighbourhood_lowers_confidence() {
        let profile = WorkerProfile { temperature: 0.0, ..WorkerProfile::new(0, 1) };
        let mut view = uniform_view(3, 3, [0, 0, 0]);
        for (i, px) in view.pixels.iter_mut().enumerate() {
            if i % 2 == 0 {
                *px = [255, 255, 255];
            }
        }
        let request = ProposalRequest { profile: &profile, view: &view, target: (1, 1), version: 0 };
        let out = NeighborhoodProposer::new(1, &profile).propose(&request).unwrap();
        assert!(out[0].confidence < 0.5);
    }
}
