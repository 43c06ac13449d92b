// src/engine/mod.rs

//! Build orchestration.
//!
//! [`BuildLoop`] runs caller build logic against a [`crate::Context`],
//! collects and reports errors and statistics, then blocks on
//! [`LoopSignals`] to decide whether to stop or rebuild.

pub mod report;
pub mod runtime;

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::context::ExecutedJob;
use crate::errors::BuildError;

pub use runtime::BuildLoop;

/// Outcome of a single build iteration.
#[derive(Debug)]
pub struct IterationReport {
    /// Build function error first (if any), then job errors in arrival order.
    pub errors: Vec<BuildError>,
    pub elapsed: Duration,
    pub num_jobs: u64,
    pub num_jobs_executed: u64,
    pub executed_jobs: Vec<ExecutedJob>,
}

impl IterationReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Channels the build loop listens on between iterations.
#[derive(Debug)]
pub struct LoopSignals {
    /// Stop after the current iteration.
    pub finish: mpsc::Receiver<()>,
    /// Rebuild requests from the watcher.
    pub rebuild: Option<mpsc::Receiver<()>>,
    /// Acknowledges a finished rebuild back to the watcher.
    pub rebuild_done: Option<mpsc::Sender<()>>,
}

impl LoopSignals {
    pub fn new(finish: mpsc::Receiver<()>) -> Self {
        Self {
            finish,
            rebuild: None,
            rebuild_done: None,
        }
    }

    /// Signals with the finish signal already raised: exactly one iteration.
    pub fn once() -> Self {
        let (tx, rx) = mpsc::channel(1);
        tx.try_send(()).ok();
        Self::new(rx)
    }

    pub fn with_watcher(mut self, rebuild: mpsc::Receiver<()>, rebuild_done: mpsc::Sender<()>) -> Self {
        self.rebuild = Some(rebuild);
        self.rebuild_done = Some(rebuild_done);
        self
    }

    pub(crate) fn ack_rebuild(&self) {
        if let Some(done) = &self.rebuild_done {
            if let Err(err) = done.try_send(()) {
                debug!(error = %err, "rebuild acknowledgement not delivered");
            }
        }
    }
}
