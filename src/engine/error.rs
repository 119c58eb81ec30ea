//! Error types surfaced by the coordination core.

use std::path::PathBuf;

/// Failures raised by [`Canvas`](super::Canvas) operations.
#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    /// A write addressed a cell outside `[0, width) x [0, height)`.
    #[error("cell ({x}, {y}) is outside the {width}x{height} canvas")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    /// Export was requested for a canvas with no pixels.
    #[error("cannot export an empty canvas")]
    EmptyCanvas,

    /// Encoding or writing the image failed.
    #[error("failed to export canvas: {0}")]
    Export(#[from] image::ImageError),

    /// Creating the destination directory failed.
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid run configuration, detected before any thread is spawned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("worker count must be at least 1 for a {width}x{height} canvas")]
    NoWorkers { width: usize, height: usize },

    #[error("overlap ratio must be finite and non-negative, got {0}")]
    InvalidOverlap(f64),

    #[error("confidence floor must be finite and positive, got {0}")]
    InvalidConfidenceFloor(f64),

    #[error("queue wait must be non-zero")]
    ZeroQueueWait,

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors reported by the lifecycle controller.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("run already stopped; build a new coordinator to run again")]
    AlreadyStopped,

    #[error("aggregator thread panicked")]
    AggregatorPanicked,

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
