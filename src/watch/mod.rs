// src/watch/mod.rs

//! File watching and rebuild triggering.
//!
//! This module is responsible for:
//! - Wiring up a cross-platform filesystem watcher (`notify`) on the source
//!   tree.
//! - Dropping noise: editor backups, metadata-only changes, build output and
//!   user `ignore` globs.
//! - Coalescing bursts of changes into a single rebuild request.
//!
//! It does **not** know what a build does; it only tells the build loop that
//! one is due.

pub mod coalesce;
pub mod event;
pub mod patterns;
pub mod watcher;

pub use coalesce::coalesce_events;
pub use event::{WatchEvent, WatchOp};
pub use patterns::{compile_ignore_set, EventFilter};
pub use watcher::{spawn_watcher, WatcherHandle};
