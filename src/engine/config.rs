//! Run configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::tile_grid::DEFAULT_OVERLAP_RATIO;
use super::{ConfigError, FrameDimensions};

/// Everything the coordination core reads at start-up.
///
/// Loaded from TOML; every field has a default so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Canvas width in pixels
    pub width: usize,
    /// Canvas height in pixels
    pub height: usize,
    /// Number of worker threads (one tile each)
    pub workers: usize,
    /// Tile growth on every side, as a fraction of the base tile size
    pub overlap_ratio: f64,

    /// Longest the aggregator waits for proposals before re-checking stop
    /// conditions (milliseconds)
    pub queue_wait_ms: u64,
    /// Auto-stop once the canvas age reaches this value
    pub age_limit: Option<u64>,
    /// Weight substituted for non-positive confidences
    pub confidence_floor: f64,
    /// Drop proposals whose version lags the current age by more than this
    pub stale_threshold: Option<u64>,

    /// Worker sleep between iterations (milliseconds)
    pub throttle_ms: u64,
    /// Worker sleep when its tile is empty (milliseconds)
    pub idle_ms: u64,
    /// Worker sleep after a failed proposal call (milliseconds)
    pub backoff_ms: u64,
    /// Minimum gap between "no proposals" log lines per worker (milliseconds)
    pub empty_log_interval_ms: u64,

    /// Directory for per-cycle frames; `None` disables frame export
    pub frames_dir: Option<PathBuf>,
    /// Zero-padding width of frame sequence numbers
    pub frame_digits: usize,
    /// Export the canvas here when the controller stops
    pub final_output: Option<PathBuf>,

    /// Base seed for per-worker RNGs
    pub seed: u64,
    /// Field-of-view radius handed to proposers
    pub fov_radius: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            workers: 16,
            overlap_ratio: DEFAULT_OVERLAP_RATIO,
            queue_wait_ms: 2_000,
            age_limit: None,
            confidence_floor: 0.01,
            stale_threshold: None,
            throttle_ms: 10,
            idle_ms: 10,
            backoff_ms: 500,
            empty_log_interval_ms: 5_000,
            frames_dir: None,
            frame_digits: 4,
            final_output: None,
            seed: 0x5EED,
            fov_radius: 3,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations the core cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 && self.dimensions().area() > 0 {
            return Err(ConfigError::NoWorkers { width: self.width, height: self.height });
        }
        if !self.overlap_ratio.is_finite() || self.overlap_ratio < 0.0 {
            return Err(ConfigError::InvalidOverlap(self.overlap_ratio));
        }
        if !self.confidence_floor.is_finite() || self.confidence_floor <= 0.0 {
            return Err(ConfigError::InvalidConfidenceFloor(self.confidence_floor));
        }
        if self.queue_wait_ms == 0 {
            return Err(ConfigError::ZeroQueueWait);
        }
        Ok(())
    }

    #[inline]
    pub fn dimensions(&self) -> FrameDimensions {
        FrameDimensions { width: self.width, height: self.height }
    }

    pub fn queue_wait(&self) -> Duration {
        Duration::from_millis(self.queue_wait_ms)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn empty_log_interval(&self) -> Duration {
        Duration::from_millis(self.empty_log_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.queue_wait(), Duration::from_secs(2));
        assert!((config.overlap_ratio - 0.4).abs() < f64::EPSILON);
        assert!((config.confidence_floor - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            width = 32
            height = 16
            workers = 4
            age_limit = 10
            frames_dir = "frames"
            "#,
        )
        .unwrap();
        assert_eq!(config.dimensions(), FrameDimensions { width: 32, height: 16 });
        assert_eq!(config.age_limit, Some(10));
        assert_eq!(config.frames_dir.as_deref(), Some(Path::new("frames")));
        assert_eq!(config.frame_digits, 4);
        assert_eq!(config.throttle_ms, 10);
    }

    #[test]
    fn test_zero_workers_rejected_for_non_empty_canvas() {
        let err = SyncConfig::from_toml_str("workers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::NoWorkers { width: 224, height: 224 }));

        let config = SyncConfig { workers: 0, width: 0, ..Default::default() };
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_overlap = SyncConfig { overlap_ratio: -0.1, ..Default::default() };
        assert!(matches!(bad_overlap.validate(), Err(ConfigError::InvalidOverlap(_))));

        let bad_floor = SyncConfig { confidence_floor: 0.0, ..Default::default() };
        assert!(matches!(bad_floor.validate(), Err(ConfigError::InvalidConfidenceFloor(_))));

        let bad_wait = SyncConfig { queue_wait_ms: 0, ..Default::default() };
        assert!(matches!(bad_wait.validate(), Err(ConfigError::ZeroQueueWait)));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(SyncConfig::from_toml_str("width = \"wide\""), Err(ConfigError::Parse(_))));
    }
}
