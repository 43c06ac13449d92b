// src/engine/report.rs

//! End-of-iteration log output.
//!
//! Every list is capped so one bad sweep can't flood the terminal.

use std::time::Duration;

use tracing::{error, info};

use crate::context::ExecutedJob;
use crate::errors::BuildError;

/// Maximum number of items printed per list.
pub const MAX_REPORTED: usize = 10;

/// Split `items` into the part that gets printed and the number left out.
pub fn capped<T>(items: &[T]) -> (&[T], usize) {
    let shown = items.len().min(MAX_REPORTED);
    (&items[..shown], items.len() - shown)
}

pub fn log_errors(errors: &[BuildError]) {
    let (shown, omitted) = capped(errors);
    for err in shown {
        error!("Build error: {err}");
    }
    if omitted > 0 {
        error!("... too many errors ({omitted} more not shown)");
    }
}

pub fn log_executed_jobs(jobs: &[ExecutedJob]) {
    let (shown, omitted) = capped(jobs);
    for job in shown {
        info!("Executed job: {} (time: {:?})", job.name, job.duration);
    }
    if omitted > 0 {
        info!("... many jobs executed ({omitted} more not shown)");
    }
}

pub fn log_summary(elapsed: Duration, num_jobs_executed: u64, num_jobs: u64) {
    info!(
        "Built in {:?} ({} / {} job(s) did work)",
        elapsed, num_jobs_executed, num_jobs
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_keeps_everything_up_to_the_limit() {
        let items: Vec<u32> = (0..10).collect();
        let (shown, omitted) = capped(&items);
        assert_eq!(shown.len(), 10);
        assert_eq!(omitted, 0);
    }

    #[test]
    fn capped_reports_how_many_were_left_out() {
        let items: Vec<u32> = (0..25).collect();
        let (shown, omitted) = capped(&items);
        assert_eq!(shown, &items[..10]);
        assert_eq!(omitted, 15);
    }

    #[test]
    fn capped_handles_empty_lists() {
        let (shown, omitted) = capped::<u32>(&[]);
        assert!(shown.is_empty());
        assert_eq!(omitted, 0);
    }
}
