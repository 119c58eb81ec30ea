// engine/mod.rs
mod aggregator;
mod canvas;
mod config;
mod engine_core;
mod error;
mod geom;
mod proposal;
mod proposers;
mod queue;
mod scheduler;
mod stats;
mod tile_grid;
mod types;
mod worker;

pub use aggregator::{blend, resolve_batch, BlendPolicy, CycleOutcome, Resolution};
pub use canvas::{frame_path, Canvas, CanvasView};
pub use config::SyncConfig;
pub use engine_core::{Coordinator, LifecycleState};
pub use error::{CanvasError, ConfigError, SyncError};
pub use proposal::{Proposal, ProposalRequest, Proposer, ProposerFactory, WorkerProfile};
pub use proposers::{neighborhood_stats, NeighborhoodProposer};
pub use queue::ProposalQueue;
pub use stats::SyncStats;
pub use tile_grid::{TileGrid, DEFAULT_OVERLAP_RATIO};
pub use types::{Cell, FrameDimensions, Rgb, TileBounds};
