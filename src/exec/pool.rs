// src/exec/pool.rs

//! Fixed-size worker pool that runs jobs in sequential phases.
//!
//! A phase starts with [`WorkerPool::run`], which opens the job channel and
//! spawns the workers, and ends with [`WorkerPool::wait`], which closes the
//! channel, lets every queued job finish and collects the phase's errors.
//! A failed phase leaves the pool closed: enqueueing into it panics, which is
//! how the remaining steps of a failed build get abandoned.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, Dispatch};

use crate::context::stats::{ExecutedJob, Stats};
use crate::errors::BuildError;
use crate::exec::job::Job;

/// Queue slots per worker.
const QUEUE_SLOTS_PER_WORKER: usize = 8;

/// Result of draining one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseResult {
    /// Jobs enqueued during the phase.
    pub num_jobs: u64,
    /// False if any job of the phase (or of an earlier, failed phase) failed.
    pub ok: bool,
}

enum PoolState {
    Closed { failed: bool },
    Running(Phase),
}

struct Phase {
    tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    errors_rx: mpsc::UnboundedReceiver<BuildError>,
    num_jobs: u64,
}

pub struct WorkerPool {
    concurrency: usize,
    stats: Arc<Stats>,
    dispatch: Dispatch,
    state: Mutex<PoolState>,
    errors: Mutex<Vec<BuildError>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("concurrency", &self.concurrency)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(concurrency: usize, stats: Arc<Stats>, dispatch: Dispatch) -> Self {
        Self {
            concurrency: concurrency.max(1),
            stats,
            dispatch,
            state: Mutex::new(PoolState::Closed { failed: false }),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state(), PoolState::Running(_))
    }

    /// Open the job channel and start the workers. No-op if already running.
    pub fn run(&self) {
        let mut state = self.state();
        if matches!(*state, PoolState::Running(_)) {
            debug!("worker pool already running");
            return;
        }

        let (tx, rx) = mpsc::channel::<Job>(self.concurrency * QUEUE_SLOTS_PER_WORKER);
        let (errors_tx, errors_rx) = mpsc::unbounded_channel::<BuildError>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..self.concurrency)
            .map(|id| {
                tokio::spawn(
                    worker_loop(
                        id,
                        Arc::clone(&rx),
                        errors_tx.clone(),
                        Arc::clone(&self.stats),
                        self.dispatch.clone(),
                    )
                    .with_subscriber(self.dispatch.clone()),
                )
            })
            .collect();

        debug!(workers = self.concurrency, "worker pool started");

        *state = PoolState::Running(Phase {
            tx,
            workers,
            errors_rx,
            num_jobs: 0,
        });
    }

    /// Queue a job for the current phase.
    ///
    /// # Panics
    ///
    /// If the pool is not running: either a previous phase failed, or the
    /// caller forgot to re-arm it.
    pub async fn enqueue(&self, job: Job) {
        let tx = {
            let mut state = self.state();
            match &mut *state {
                PoolState::Running(phase) => {
                    phase.num_jobs += 1;
                    Ok(phase.tx.clone())
                }
                PoolState::Closed { failed } => Err(*failed),
            }
        };

        match tx {
            Ok(tx) => {
                if tx.send(job).await.is_err() {
                    panic!("worker pool shut down while a job was being enqueued");
                }
            }
            Err(true) => panic!(
                "job {} enqueued after a failed phase; no further work may be scheduled",
                job.display_name()
            ),
            Err(false) => panic!(
                "job {} enqueued while the worker pool is not running",
                job.display_name()
            ),
        }
    }

    /// Close the job channel and block until every job of the phase is done.
    ///
    /// Job errors are appended to the pool's accumulated error list. Waiting
    /// on a closed pool drains nothing and reports whether the last phase
    /// failed.
    pub async fn wait(&self) -> PhaseResult {
        let phase = {
            let mut state = self.state();
            match std::mem::replace(&mut *state, PoolState::Closed { failed: false }) {
                PoolState::Running(phase) => phase,
                PoolState::Closed { failed } => {
                    *state = PoolState::Closed { failed };
                    return PhaseResult {
                        num_jobs: 0,
                        ok: !failed,
                    };
                }
            }
        };

        let Phase {
            tx,
            workers,
            mut errors_rx,
            num_jobs,
        } = phase;

        // Workers exit once the channel is closed and drained.
        drop(tx);
        for worker in workers {
            if let Err(err) = worker.await {
                error!(error = %err, "pool worker terminated abnormally");
            }
        }

        let mut phase_errors = Vec::new();
        while let Ok(err) = errors_rx.try_recv() {
            phase_errors.push(err);
        }

        let failed = !phase_errors.is_empty();
        debug!(num_jobs, errors = phase_errors.len(), "phase finished");

        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(phase_errors);
        *self.state() = PoolState::Closed { failed };

        PhaseResult {
            num_jobs,
            ok: !failed,
        }
    }

    /// Take every error accumulated since the last call, in arrival order.
    pub fn take_errors(&self) -> Vec<BuildError> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn worker_loop(
    id: usize,
    jobs: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    errors: mpsc::UnboundedSender<BuildError>,
    stats: Arc<Stats>,
    dispatch: Dispatch,
) {
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        let name = job.display_name();
        let started = Instant::now();

        // Each job gets its own task so a panic is contained to that job.
        let outcome = tokio::spawn(job.into_future().with_subscriber(dispatch.clone())).await;

        let reported = match outcome {
            Ok(Ok(true)) => {
                stats.record_executed(ExecutedJob {
                    name,
                    duration: started.elapsed(),
                });
                None
            }
            Ok(Ok(false)) => None,
            Ok(Err(source)) => Some(BuildError::Job { name, source }),
            Err(err) if err.is_panic() => Some(BuildError::JobPanicked {
                name,
                message: panic_message(err.into_panic()),
            }),
            Err(err) => Some(BuildError::Job {
                name,
                source: err.into(),
            }),
        };

        if let Some(err) = reported {
            // Reported, capped, at the end of the iteration.
            debug!(worker = id, error = %err, "job failed");
            if errors.send(err).is_err() {
                debug!(worker = id, "error receiver gone; dropping job error");
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(concurrency: usize) -> (WorkerPool, Arc<Stats>) {
        let stats = Arc::new(Stats::default());
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        (WorkerPool::new(concurrency, Arc::clone(&stats), dispatch), stats)
    }

    #[tokio::test]
    async fn clean_phase_reports_ok_and_counts_jobs() {
        let (pool, _) = pool(3);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.run();
        for i in 0..7 {
            let counter = Arc::clone(&counter);
            pool.enqueue(Job::new(format!("job {i}"), async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }))
            .await;
        }

        let result = pool.wait().await;
        assert_eq!(result, PhaseResult { num_jobs: 7, ok: true });
        assert_eq!(counter.load(Ordering::SeqCst), 7);
        assert!(!pool.is_running());
        assert!(pool.take_errors().is_empty());
    }

    #[tokio::test]
    async fn pool_can_be_rearmed_after_clean_phase() {
        let (pool, _) = pool(2);

        pool.run();
        pool.enqueue(Job::unnamed(async { Ok(false) })).await;
        assert!(pool.wait().await.ok);

        pool.run();
        pool.enqueue(Job::unnamed(async { Ok(false) })).await;
        assert_eq!(pool.wait().await, PhaseResult { num_jobs: 1, ok: true });
    }

    #[tokio::test]
    async fn failed_phase_collects_errors_and_stays_failed() {
        let (pool, _) = pool(2);

        pool.run();
        pool.enqueue(Job::new("bad", async { Err(anyhow!("boom")) }))
            .await;
        pool.enqueue(Job::new("good", async { Ok(true) })).await;

        assert!(!pool.wait().await.ok);
        // A second wait has nothing to drain but still reports the failure.
        assert_eq!(pool.wait().await, PhaseResult { num_jobs: 0, ok: false });

        let errors = pool.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], BuildError::Job { name, .. } if name == "bad"));
    }

    #[tokio::test]
    async fn executed_jobs_are_recorded_with_names() {
        let (pool, stats) = pool(2);

        pool.run();
        pool.enqueue(Job::new("did work", async { Ok(true) })).await;
        pool.enqueue(Job::new("skipped", async { Ok(false) })).await;
        pool.wait().await;

        let executed = stats.executed_jobs();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].name, "did work");
    }

    #[tokio::test]
    async fn panicking_job_is_reported_without_killing_siblings() {
        let (pool, _) = pool(1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.run();
        pool.enqueue(Job::new("panics", async { panic!("kaboom") }))
            .await;
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            pool.enqueue(Job::unnamed(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }))
            .await;
        }

        assert!(!pool.wait().await.ok);
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        let errors = pool.take_errors();
        assert!(matches!(
            &errors[0],
            BuildError::JobPanicked { name, message } if name == "panics" && message == "kaboom"
        ));
    }

    #[tokio::test]
    async fn blocking_job_panic_is_reported_as_panic() {
        let (pool, _) = pool(1);

        pool.run();
        pool.enqueue(Job::blocking("blocking panic", || panic!("sync kaboom")))
            .await;

        assert!(!pool.wait().await.ok);
        let errors = pool.take_errors();
        assert!(matches!(&errors[0], BuildError::JobPanicked { .. }));
    }

    #[tokio::test]
    #[should_panic(expected = "after a failed phase")]
    async fn enqueue_after_failed_phase_panics() {
        let (pool, _) = pool(1);

        pool.run();
        pool.enqueue(Job::new("bad", async { Err(anyhow!("boom")) }))
            .await;
        assert!(!pool.wait().await.ok);

        pool.enqueue(Job::unnamed(async { Ok(false) })).await;
    }

    #[tokio::test]
    #[should_panic(expected = "not running")]
    async fn enqueue_on_unarmed_pool_panics() {
        let (pool, _) = pool(1);
        pool.enqueue(Job::unnamed(async { Ok(false) })).await;
    }
}
