// src/exec/job.rs

//! A single unit of work handed to the worker pool.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tracing::Dispatch;

/// Future run by a [`Job`].
///
/// Resolves to `Ok(true)` when the job did real work, `Ok(false)` when it
/// found nothing to do, and `Err` when it failed.
pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'static>>;

/// Caller-supplied work, consumed exactly once by a pool worker.
pub struct Job {
    name: Option<String>,
    run: JobFuture,
}

impl Job {
    /// Named async job. The name shows up in error and executed-job reports.
    pub fn new<F>(name: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self {
            name: Some(name.into()),
            run: Box::pin(fut),
        }
    }

    pub fn unnamed<F>(fut: F) -> Self
    where
        F: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self {
            name: None,
            run: Box::pin(fut),
        }
    }

    /// Named job running a synchronous closure on the blocking thread pool.
    ///
    /// A panic inside `f` is re-raised on the job's task so the pool reports
    /// it the same way as a panicking async job.
    pub fn blocking<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<bool> + Send + 'static,
    {
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        Self::new(name, async move {
            let handle = tokio::task::spawn_blocking(move || {
                tracing::dispatcher::with_default(&dispatch, f)
            });
            match handle.await {
                Ok(res) => res,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => Err(err.into()),
            }
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name used in logs, with a placeholder for unnamed jobs.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }

    pub(crate) fn into_future(self) -> JobFuture {
        self.run
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
