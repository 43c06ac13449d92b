// src/exec/mod.rs

//! Job execution layer.
//!
//! - [`job`] defines the unit of work build logic hands to the pool.
//! - [`pool`] owns the fixed set of workers and the phase/error protocol.

pub mod job;
pub mod pool;

pub use job::{Job, JobFuture};
pub use pool::{PhaseResult, WorkerPool};
