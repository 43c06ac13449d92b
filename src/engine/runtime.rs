// src/engine/runtime.rs

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::context::Context;
use crate::errors::BuildError;

use super::report;
use super::{IterationReport, LoopSignals};

/// Drives caller build logic, one iteration per rebuild.
///
/// Each iteration resets statistics, arms the worker pool, runs the build
/// function, drains its last phase and reports. Between iterations the loop
/// waits for either the finish signal or a rebuild request.
pub struct BuildLoop<F> {
    ctx: Context,
    build_fn: F,
}

impl<F> fmt::Debug for BuildLoop<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildLoop")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl<F, Fut> BuildLoop<F>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    pub fn new(ctx: Context, build_fn: F) -> Self {
        Self { ctx, build_fn }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run one build iteration and log its outcome.
    pub async fn run_iteration(&mut self) -> IterationReport {
        debug!("start loop");
        self.ctx.begin_iteration();

        let result = (self.build_fn)(self.ctx.clone()).await;

        // Final phase boundary; jobs queued after the last `wait` run here.
        self.ctx.finish_phase().await;

        let stats = self.ctx.stats();
        let elapsed = stats.elapsed();

        // The build function's own error always comes first.
        let mut errors = Vec::new();
        if let Err(err) = result {
            errors.push(BuildError::Build(err));
        }
        errors.extend(self.ctx.take_errors());

        let iteration = IterationReport {
            errors,
            elapsed,
            num_jobs: stats.num_jobs(),
            num_jobs_executed: stats.num_jobs_executed(),
            executed_jobs: stats.executed_jobs(),
        };

        report::log_errors(&iteration.errors);
        // Nearly everything runs on a cold start, so only later iterations
        // list their executed jobs.
        if !self.ctx.first_run() {
            report::log_executed_jobs(&iteration.executed_jobs);
        }
        report::log_summary(
            iteration.elapsed,
            iteration.num_jobs_executed,
            iteration.num_jobs,
        );

        self.ctx.clear_first_run();
        iteration
    }

    /// Loop until the finish signal arrives.
    ///
    /// Returns true if the last completed iteration had no errors.
    pub async fn run(mut self, mut signals: LoopSignals) -> bool {
        let mut triggered_by_watcher = false;

        loop {
            let iteration = self.run_iteration().await;
            let success = iteration.is_success();

            if triggered_by_watcher {
                signals.ack_rebuild();
            }

            tokio::select! {
                biased;

                _ = signals.finish.recv() => {
                    info!("detected finish signal; stopping");
                    return success;
                }
                Some(()) = recv_rebuild(&mut signals.rebuild) => {
                    info!("detected change; rebuilding");
                    triggered_by_watcher = true;
                }
            }
        }
    }
}

/// Next rebuild request, or never if there is no watcher.
async fn recv_rebuild(rebuild: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match rebuild {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
