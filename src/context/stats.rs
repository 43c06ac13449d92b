// src/context/stats.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A job that did real work, kept for the end-of-iteration report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedJob {
    pub name: String,
    pub duration: Duration,
}

/// Statistics for one build iteration.
///
/// Reset at the start of every iteration and cumulative across the phases
/// within it. Counters touched from concurrent jobs are atomics.
#[derive(Debug)]
pub struct Stats {
    num_jobs: AtomicU64,
    num_jobs_executed: AtomicU64,
    executed_jobs: Mutex<Vec<ExecutedJob>>,
    start: Mutex<Instant>,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            num_jobs: AtomicU64::new(0),
            num_jobs_executed: AtomicU64::new(0),
            executed_jobs: Mutex::new(Vec::new()),
            start: Mutex::new(Instant::now()),
        }
    }
}

impl Stats {
    pub fn reset(&self) {
        self.num_jobs.store(0, Ordering::SeqCst);
        self.num_jobs_executed.store(0, Ordering::SeqCst);
        self.executed_jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.start.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Total jobs generated across all phases of the iteration.
    pub fn num_jobs(&self) -> u64 {
        self.num_jobs.load(Ordering::SeqCst)
    }

    /// Jobs that found a changed input or ran under a forced context.
    pub fn num_jobs_executed(&self) -> u64 {
        self.num_jobs_executed.load(Ordering::SeqCst)
    }

    pub fn executed_jobs(&self) -> Vec<ExecutedJob> {
        self.executed_jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn start(&self) -> Instant {
        *self.start.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn elapsed(&self) -> Duration {
        self.start().elapsed()
    }

    pub(crate) fn add_jobs(&self, n: u64) {
        self.num_jobs.fetch_add(n, Ordering::SeqCst);
    }

    pub(crate) fn mark_executed(&self) {
        self.num_jobs_executed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_executed(&self, job: ExecutedJob) {
        self.executed_jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_counters_and_descriptors() {
        let stats = Stats::default();
        stats.add_jobs(4);
        stats.mark_executed();
        stats.record_executed(ExecutedJob {
            name: "copy a.txt".into(),
            duration: Duration::from_millis(3),
        });
        let first_start = stats.start();

        stats.reset();

        assert_eq!(stats.num_jobs(), 0);
        assert_eq!(stats.num_jobs_executed(), 0);
        assert!(stats.executed_jobs().is_empty());
        assert!(stats.start() >= first_start);
    }
}
