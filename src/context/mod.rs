// src/context/mod.rs

//! Per-run state handed to caller build logic.
//!
//! A [`Context`] is a cheap handle: clones and the view returned by
//! [`Context::forced_context`] share the same pool, change cache and
//! statistics. Only the `forced` flag is per-handle.

pub mod cache;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::Dispatch;

use crate::errors::BuildError;
use crate::exec::{Job, WorkerPool};
use crate::fs::FileSystem;

pub use cache::ChangeCache;
pub use stats::{ExecutedJob, Stats};

/// Everything needed to build a [`Context`].
#[derive(Debug)]
pub struct ContextArgs {
    pub concurrency: usize,
    pub log: Dispatch,
    pub fs: Arc<dyn FileSystem>,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
}

#[derive(Debug)]
struct Shared {
    pool: WorkerPool,
    cache: ChangeCache,
    stats: Arc<Stats>,
    fs: Arc<dyn FileSystem>,
    log: Dispatch,
    source_dir: PathBuf,
    target_dir: PathBuf,
    first_run: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct Context {
    shared: Arc<Shared>,
    forced: bool,
}

impl Context {
    pub fn new(args: ContextArgs) -> Self {
        let stats = Arc::new(Stats::default());
        let pool = WorkerPool::new(args.concurrency, Arc::clone(&stats), args.log.clone());
        Self {
            shared: Arc::new(Shared {
                pool,
                cache: ChangeCache::new(Arc::clone(&args.fs)),
                stats,
                fs: args.fs,
                log: args.log,
                source_dir: args.source_dir,
                target_dir: args.target_dir,
                first_run: AtomicBool::new(true),
            }),
            forced: false,
        }
    }

    /// Queue a job in the current phase.
    ///
    /// # Panics
    ///
    /// If the current phase already failed (see [`Context::wait`]).
    pub async fn enqueue(&self, job: Job) {
        self.shared.pool.enqueue(job).await;
    }

    /// Logging capability for this run.
    pub fn log(&self) -> &Dispatch {
        &self.shared.log
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.shared.fs
    }

    pub fn source_dir(&self) -> &Path {
        &self.shared.source_dir
    }

    pub fn target_dir(&self) -> &Path {
        &self.shared.target_dir
    }

    pub fn stats(&self) -> &Stats {
        &self.shared.stats
    }

    pub fn concurrency(&self) -> usize {
        self.shared.pool.concurrency()
    }

    /// True only during the first iteration of the build loop.
    pub fn first_run(&self) -> bool {
        self.shared.first_run.load(Ordering::SeqCst)
    }

    /// Whether `path` is unchanged since it was last checked.
    ///
    /// Counts an executed job whenever the path changed or this context is
    /// forced. The verdict itself never depends on `forced`: callers holding
    /// a forced context do their work regardless.
    pub fn is_unchanged(&self, path: impl AsRef<Path>) -> bool {
        let unchanged = self.shared.cache.is_unchanged(path.as_ref());
        if !unchanged || self.forced {
            self.shared.stats.mark_executed();
        }
        unchanged
    }

    pub fn forced(&self) -> bool {
        self.forced
    }

    /// A view of this context whose consumers must do their work
    /// unconditionally. Shares pool, cache and statistics.
    pub fn forced_context(&self) -> Context {
        Context {
            shared: Arc::clone(&self.shared),
            forced: true,
        }
    }

    /// Wait for the current phase's jobs to finish.
    ///
    /// Returns true if they all succeeded, in which case the pool is re-armed
    /// and more jobs may be queued. Returns false if any failed; build logic
    /// should then return so the errors can be reported, since queueing
    /// further jobs would panic.
    pub async fn wait(&self) -> bool {
        if !self.finish_phase().await {
            return false;
        }
        self.shared.pool.run();
        true
    }

    /// Drain the current phase without re-arming the pool.
    pub(crate) async fn finish_phase(&self) -> bool {
        let phase = self.shared.pool.wait().await;
        self.shared.stats.add_jobs(phase.num_jobs);
        phase.ok
    }

    /// Reset statistics and open the pool for a new iteration.
    pub(crate) fn begin_iteration(&self) {
        self.shared.stats.reset();
        self.shared.pool.run();
    }

    pub(crate) fn take_errors(&self) -> Vec<BuildError> {
        self.shared.pool.take_errors()
    }

    pub(crate) fn clear_first_run(&self) {
        self.shared.first_run.store(false, Ordering::SeqCst);
    }
}
