//! PixelSwarm: many workers propose pixel edits on overlapping tiles of one
//! shared canvas; an aggregator merges them into versioned frames.
//!
//! ```text
//! TileGrid -> WorkerLoop x N -> ProposalQueue -> Aggregator -> Canvas
//!                  ^                                             |
//!                  +-------------------- read -------------------+
//! ```

pub mod engine;

pub use engine::{
    Canvas, CanvasView, Coordinator, FrameDimensions, NeighborhoodProposer, Proposal, ProposalRequest,
    Proposer, SyncConfig, SyncError, SyncStats, TileBounds, TileGrid, WorkerProfile,
};
