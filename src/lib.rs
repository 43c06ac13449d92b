// src/lib.rs

//! `kiln` runs caller build logic over a source tree, incrementally.
//!
//! Build logic is an async function taking a [`Context`]. It queues [`Job`]s,
//! waits for each phase with [`Context::wait`] and asks
//! [`Context::is_unchanged`] whether an input needs reprocessing. [`build`]
//! runs it once; [`build_loop`] reruns it on every source change, serves the
//! target directory and survives restarts without dropping the listener.

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod mirror;
pub mod restart;
pub mod watch;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::instrument::WithSubscriber;
use tracing::{info, warn, Dispatch};

use crate::cli::CliArgs;
use crate::context::ContextArgs;
use crate::errors::Result;
use crate::fs::RealFileSystem;
use crate::restart::{spawn_server, spawn_signal_listener, Control, ListenerHandoff, RestartCoordinator};
use crate::watch::{spawn_watcher, EventFilter};

pub use crate::config::Config;
pub use crate::context::Context;
pub use crate::engine::{BuildLoop, IterationReport, LoopSignals};
pub use crate::exec::Job;

/// Run `build_fn` exactly once.
///
/// Returns whether the iteration finished without errors. `Err` means the
/// run could not start at all.
pub async fn build<F, Fut>(config: Config, build_fn: F) -> Result<bool>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let config = config.with_defaults();
    let dispatch = dispatch_for(&config);

    async move {
        config::validate_dirs(&config.source_dir, &config.target_dir)?;
        let ctx = new_context(&config);
        Ok(BuildLoop::new(ctx, build_fn).run(LoopSignals::once()).await)
    }
    .with_subscriber(dispatch)
    .await
}

/// Rebuild on every source change until a shutdown or restart signal.
///
/// On Unix the listener is inherited from a previous generation when one was
/// handed down, and `SIGUSR2` hands it on to a fresh copy of this process.
pub async fn build_loop<F, Fut>(config: Config, build_fn: F) -> Result<bool>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    #[cfg(unix)]
    let handoff = restart::ProcessHandoff::from_env()?;
    #[cfg(not(unix))]
    let handoff = restart::FreshBind;

    build_loop_with(config, handoff, build_fn).await
}

/// [`build_loop`] with an explicit hand-off mechanism.
pub async fn build_loop_with<H, F, Fut>(mut config: Config, handoff: H, build_fn: F) -> Result<bool>
where
    H: ListenerHandoff,
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let dispatch = dispatch_for(&config);
    config.log = Some(dispatch.clone());
    let (control_tx, control_rx) = mpsc::channel(4);
    let signals = async { spawn_signal_listener(control_tx) }
        .with_subscriber(dispatch)
        .await?;

    let result = build_loop_controlled(config, handoff, control_rx, build_fn).await;
    signals.abort();
    result
}

/// [`build_loop_with`] driven by an explicit [`Control`] channel instead of
/// process signals.
pub async fn build_loop_controlled<H, F, Fut>(
    config: Config,
    handoff: H,
    control: mpsc::Receiver<Control>,
    build_fn: F,
) -> Result<bool>
where
    H: ListenerHandoff,
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let config = config.with_defaults();
    let dispatch = dispatch_for(&config);

    async move {
        config::validate_dirs(&config.source_dir, &config.target_dir)?;
        let ctx = new_context(&config);

        let (listener, server) = match config.port {
            Some(port) => {
                let acquired = handoff.acquire(SocketAddr::from(([0, 0, 0, 0], port)))?;
                let (addr, server) = spawn_server(&acquired.listener, &config.target_dir)?;
                info!(%addr, inherited = acquired.inherited, "listening");
                (Some(acquired.listener), Some(server))
            }
            None => (None, None),
        };

        // A parent waiting on us keeps serving until this succeeds.
        if let Err(err) = handoff.notify_ready() {
            warn!(error = %err, "could not signal readiness to parent process");
        }

        let (rebuild_tx, rebuild_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::channel(1);
        let filter = EventFilter::new(&config.source_dir, &config.target_dir, &config.ignore)?;
        let _watcher = spawn_watcher(&config.source_dir, filter, rebuild_tx, done_rx)?;

        let (finish_tx, finish_rx) = mpsc::channel(1);
        let coordinator = RestartCoordinator::new(handoff, listener, server);
        let coordinator = tokio::spawn(
            coordinator
                .run(control, finish_tx)
                .with_current_subscriber(),
        );

        let signals = LoopSignals::new(finish_rx).with_watcher(rebuild_rx, done_tx);
        let success = BuildLoop::new(ctx, build_fn).run(signals).await;

        coordinator.abort();
        Ok(success)
    }
    .with_subscriber(dispatch)
    .await
}

/// High-level entry point used by `main.rs`: mirror the source tree into the
/// target directory, once or continuously.
pub async fn run(args: CliArgs) -> Result<bool> {
    let dispatch = logging::build_dispatch(args.log_level);
    let mut config =
        tracing::dispatcher::with_default(&dispatch, || cli::resolve_config(&args))?;
    config.log = Some(dispatch);

    if args.once {
        build(config, mirror::mirror_tree).await
    } else {
        build_loop(config, mirror::mirror_tree).await
    }
}

fn dispatch_for(config: &Config) -> Dispatch {
    config
        .log
        .clone()
        .unwrap_or_else(|| logging::build_dispatch(None))
}

fn new_context(config: &Config) -> Context {
    Context::new(ContextArgs {
        concurrency: config.concurrency,
        log: tracing::dispatcher::get_default(Dispatch::clone),
        fs: Arc::new(RealFileSystem),
        source_dir: config.source_dir.clone(),
        target_dir: config.target_dir.clone(),
    })
}
