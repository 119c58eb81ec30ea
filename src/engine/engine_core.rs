//! Lifecycle controller: partitions the canvas, owns the threads, stops them.
//!
//! Responsibilities:
//! - Partitions the canvas into overlapping tiles and builds one worker per tile.
//! - Launches the worker threads and the aggregator thread behind a shared running flag.
//! - On stop, clears the flag, closes the queue and joins the aggregator, which joins every worker first.
//!
//! States: Idle -> Partitioned -> Running -> Stopped. `start`, `run` and `stop`
//! are idempotent within their state.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;

use parking_lot::Mutex;
use tracing::{info, warn};

use super::aggregator::Aggregator;
use super::scheduler::TargetSampler;
use super::stats::SyncCounters;
use super::worker::{WorkerLoop, WorkerTiming};
use super::{
    Canvas, CanvasView, ProposalQueue, Proposer, ProposerFactory, SyncConfig, SyncError, SyncStats,
    TileBounds, TileGrid, WorkerProfile,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, nothing computed.
    Idle,
    /// Tiles computed and workers built, no thread running.
    Partitioned,
    /// Worker and aggregator threads launched.
    Running,
    /// Flag cleared and every thread joined.
    Stopped,
}

pub struct Coordinator {
    config: SyncConfig,
    canvas: Arc<Canvas>,
    queue: Arc<ProposalQueue>,
    running: Arc<AtomicBool>,
    commit_gate: Arc<Mutex<()>>,
    counters: Arc<SyncCounters>,
    factory: ProposerFactory,

    grid: Option<TileGrid>,
    pending_workers: Vec<WorkerLoop>,
    aggregator_thread: Option<thread::JoinHandle<()>>,
    state: LifecycleState,
}

impl Coordinator {
    /// Validate `config` and allocate the canvas. No thread is started.
    pub fn new(config: SyncConfig, factory: ProposerFactory) -> Result<Self, SyncError> {
        config.validate()?;
        let canvas = Arc::new(Canvas::new(config.dimensions()));
        Ok(Self {
            config,
            canvas,
            queue: Arc::new(ProposalQueue::new()),
            running: Arc::new(AtomicBool::new(false)),
            commit_gate: Arc::new(Mutex::new(())),
            counters: Arc::new(SyncCounters::default()),
            factory,
            grid: None,
            pending_workers: Vec::new(),
            aggregator_thread: None,
            state: LifecycleState::Idle,
        })
    }

    /// Convenience over [`Coordinator::new`] for a plain closure factory.
    pub fn with_proposers<F>(config: SyncConfig, factory: F) -> Result<Self, SyncError>
    where
        F: Fn(&WorkerProfile) -> Box<dyn Proposer> + Send + Sync + 'static,
    {
        Self::new(config, Box::new(factory))
    }

    /// Compute the tiles and build (but do not launch) the workers.
    pub fn start(&mut self) -> Result<(), SyncError> {
        if self.state != LifecycleState::Idle {
            return Ok(());
        }

        let grid = TileGrid::partition(self.config.workers, self.config.dimensions(), self.config.overlap_ratio);
        let timing = WorkerTiming::from(&self.config);

        self.pending_workers = grid
            .tiles
            .iter()
            .enumerate()
            .map(|(id, &bounds)| {
                let mut sampler = TargetSampler::new(self.config.seed, id);
                let profile = sampler.sample_profile(id, self.config.fov_radius);
                let proposer = (self.factory)(&profile);
                WorkerLoop::new(
                    profile,
                    bounds,
                    proposer,
                    sampler,
                    Arc::clone(&self.canvas),
                    Arc::clone(&self.queue),
                    Arc::clone(&self.running),
                    Arc::clone(&self.counters),
                    timing,
                )
            })
            .collect();

        let idle = grid.tiles.iter().filter(|t| t.is_empty()).count();
        info!(
            workers = grid.len(),
            cols = grid.cols,
            rows = grid.rows,
            idle,
            "canvas partitioned"
        );
        self.grid = Some(grid);
        self.state = LifecycleState::Partitioned;
        Ok(())
    }

    /// Raise the running flag and launch every worker plus the aggregator.
    pub fn run(&mut self) -> Result<(), SyncError> {
        match self.state {
            LifecycleState::Running => return Ok(()),
            LifecycleState::Stopped => return Err(SyncError::AlreadyStopped),
            LifecycleState::Idle => self.start()?,
            LifecycleState::Partitioned => {}
        }

        self.running.store(true, Ordering::Release);

        let workers = std::mem::take(&mut self.pending_workers);
        let mut handles = Vec::with_capacity(workers.len());
        for worker in workers {
            let name = format!("worker-{}", worker.id());
            match thread::Builder::new().name(name.clone()).spawn(move || worker.run()) {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    self.abort_launch(handles);
                    return Err(SyncError::Spawn { name, source });
                }
            }
        }

        let aggregator = Aggregator::new(
            &self.config,
            Arc::clone(&self.canvas),
            Arc::clone(&self.queue),
            Arc::clone(&self.running),
            Arc::clone(&self.commit_gate),
            Arc::clone(&self.counters),
        );
        let spawned = thread::Builder::new()
            .name("aggregator".into())
            .spawn(move || aggregator.run(handles));
        match spawned {
            Ok(handle) => self.aggregator_thread = Some(handle),
            Err(source) => {
                // The worker handles went down with the closure; the cleared
                // flag still stops those threads on their next iteration.
                self.abort_launch(Vec::new());
                return Err(SyncError::Spawn { name: "aggregator".into(), source });
            }
        }

        self.state = LifecycleState::Running;
        info!(workers = self.config.workers, "run started");
        Ok(())
    }

    fn abort_launch(&mut self, handles: Vec<thread::JoinHandle<()>>) {
        self.running.store(false, Ordering::Release);
        self.queue.close();
        for h in handles {
            let _ = h.join();
        }
        self.state = LifecycleState::Stopped;
    }

    /// Clear the flag and block until the aggregator and every worker have
    /// exited. Nothing enqueued after this call is applied.
    pub fn stop(&mut self) -> Result<SyncStats, SyncError> {
        {
            let _commit = self.commit_gate.lock();
            self.running.store(false, Ordering::Release);
        }
        self.queue.close();
        self.finish()
    }

    /// Block until the aggregator exits on its own (age limit reached) and
    /// return the final stats. Without an age limit the aggregator never
    /// exits by itself, so use [`Coordinator::stop`] instead.
    pub fn wait(&mut self) -> Result<SyncStats, SyncError> {
        if self.state == LifecycleState::Running && self.config.age_limit.is_none() {
            warn!("waiting on a run without an age limit");
        }
        self.finish()
    }

    fn finish(&mut self) -> Result<SyncStats, SyncError> {
        if self.state == LifecycleState::Stopped {
            return Ok(self.stats());
        }

        let joined = match self.aggregator_thread.take() {
            Some(handle) => handle.join().map_err(|_| SyncError::AggregatorPanicked),
            None => Ok(()),
        };
        self.running.store(false, Ordering::Release);
        self.queue.close();
        self.pending_workers.clear();
        self.state = LifecycleState::Stopped;
        joined?;

        if let Some(path) = &self.config.final_output {
            match self.canvas.export(path) {
                Ok(()) => info!(path = %path.display(), "final canvas exported"),
                Err(e) => warn!(path = %path.display(), error = %e, "final export failed"),
            }
        }

        let stats = self.stats();
        info!(age = stats.age, cycles = stats.cycles, applied = stats.proposals_applied, "run stopped");
        Ok(stats)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// True while the shared flag is raised; goes false on stop or when the
    /// aggregator hits the age limit.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True once the aggregator thread has exited (or was never launched).
    pub fn is_finished(&self) -> bool {
        self.aggregator_thread.as_ref().map_or(true, |h| h.is_finished())
    }

    pub fn canvas(&self) -> &Arc<Canvas> {
        &self.canvas
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn tiles(&self) -> Option<&TileGrid> {
        self.grid.as_ref()
    }

    pub fn worker_bounds(&self, worker: usize) -> Option<TileBounds> {
        self.grid.as_ref()?.bounds(worker)
    }

    /// Read restricted to `worker`'s tile: the request is intersected with
    /// the tile, and an unknown worker or disjoint request yields an empty
    /// view.
    pub fn read_for_worker(&self, worker: usize, x: usize, y: usize, w: usize, h: usize) -> CanvasView {
        let Some(tile) = self.worker_bounds(worker) else {
            return CanvasView::default();
        };
        let request = TileBounds { x0: x, x1: x.saturating_add(w), y0: y, y1: y.saturating_add(h) };
        let clipped = tile.intersect(&request);
        if clipped.is_empty() {
            return CanvasView::default();
        }
        self.canvas.read_bounds(&clipped)
    }

    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot(self.canvas.age())
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if self.state == LifecycleState::Running {
            if let Err(e) = self.stop() {
                warn!(error = %e, "stop on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ConfigError, Proposal, ProposalRequest};

    fn silent(_: &WorkerProfile) -> Box<dyn Proposer> {
        Box::new(|_: &ProposalRequest<'_>| -> anyhow::Result<Vec<Proposal>> { Ok(Vec::new()) })
    }

    fn config(workers: usize) -> SyncConfig {
        SyncConfig {
            width: 8,
            height: 8,
            workers,
            queue_wait_ms: 20,
            throttle_ms: 1,
            idle_ms: 1,
            backoff_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_workers_is_config_error() {
        let err = Coordinator::with_proposers(config(0), silent).err().unwrap();
        assert!(matches!(err, SyncError::Config(ConfigError::NoWorkers { .. })));
    }

    #[test]
    fn test_start_partitions_once() {
        let mut c = Coordinator::with_proposers(config(4), silent).unwrap();
        assert_eq!(c.state(), LifecycleState::Idle);
        assert!(c.tiles().is_none());

        c.start().unwrap();
        assert_eq!(c.state(), LifecycleState::Partitioned);
        let tiles = c.tiles().unwrap().clone();
        assert_eq!(tiles.len(), 4);
        assert!(!c.is_running());

        c.start().unwrap();
        assert_eq!(c.tiles().unwrap(), &tiles);
    }

    #[test]
    fn test_run_is_idempotent_and_stop_joins() {
        let mut c = Coordinator::with_proposers(config(2), silent).unwrap();
        c.run().unwrap();
        assert_eq!(c.state(), LifecycleState::Running);
        assert!(c.is_running());
        c.run().unwrap();

        c.stop().unwrap();
        assert_eq!(c.state(), LifecycleState::Stopped);
        assert!(!c.is_running());
        assert!(c.is_finished());
        // stopping twice is fine
        c.stop().unwrap();
        assert!(matches!(c.run(), Err(SyncError::AlreadyStopped)));
    }

    #[test]
    fn test_run_launches_every_partitioned_worker() {
        use std::collections::HashSet;
        use std::time::{Duration, Instant};

        let seen = Arc::new(Mutex::new(HashSet::new()));
        let sink = Arc::clone(&seen);
        let mut c = Coordinator::with_proposers(config(4), move |_: &WorkerProfile| {
            let sink = Arc::clone(&sink);
            Box::new(move |req: &ProposalRequest<'_>| -> anyhow::Result<Vec<Proposal>> {
                sink.lock().insert(req.profile.worker_id);
                Ok(vec![req.propose([7, 7, 7], 1.0)])
            }) as Box<dyn Proposer>
        })
        .unwrap();

        c.start().unwrap();
        c.run().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while (seen.lock().len() < 4 || c.canvas().age() == 0) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let stats = c.stop().unwrap();

        assert_eq!(seen.lock().len(), 4);
        assert!(stats.age >= 1);
        assert!(stats.cells_written >= 1);
        assert_eq!(c.canvas().age(), stats.age);
    }

    #[test]
    fn test_stop_before_run() {
        let mut c = Coordinator::with_proposers(config(2), silent).unwrap();
        c.start().unwrap();
        let stats = c.stop().unwrap();
        assert_eq!(stats.age, 0);
        assert_eq!(c.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_read_for_worker_is_clipped_to_tile() {
        let mut c = Coordinator::with_proposers(SyncConfig { overlap_ratio: 0.0, ..config(4) }, silent).unwrap();
        assert!(c.read_for_worker(0, 0, 0, 8, 8).is_empty());

        c.start().unwrap();
        // worker 0 owns [0,4) x [0,4)
        let view = c.read_for_worker(0, 2, 2, 10, 10);
        assert_eq!(view.origin, (2, 2));
        assert_eq!((view.width, view.height), (2, 2));
        assert!(c.read_for_worker(0, 6, 6, 2, 2).is_empty());
        assert!(c.read_for_worker(99, 0, 0, 2, 2).is_empty());
    }
}
