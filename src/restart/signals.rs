// src/restart/signals.rs

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info};

use super::Control;
use crate::errors::Result;

/// Translate process signals into [`Control`] messages.
///
/// Unix: `SIGUSR2` requests a restart; `SIGTERM` and `SIGINT` request a
/// shutdown. Elsewhere only Ctrl-C is honoured.
///
/// Handlers are registered before this returns, so a signal delivered right
/// after the call is not lost.
#[cfg(unix)]
pub fn spawn_signal_listener(control: mpsc::Sender<Control>) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut restart = signal(SignalKind::user_defined2())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let task = async move {
        loop {
            let msg = tokio::select! {
                _ = restart.recv() => {
                    info!("received SIGUSR2");
                    Control::Restart
                }
                _ = terminate.recv() => {
                    info!("received SIGTERM");
                    Control::Shutdown
                }
                _ = interrupt.recv() => {
                    info!("received SIGINT");
                    Control::Shutdown
                }
            };

            if control.send(msg).await.is_err() {
                debug!("restart coordinator gone; signal listener exiting");
                return;
            }
        }
    };

    Ok(tokio::spawn(task.with_current_subscriber()))
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(control: mpsc::Sender<Control>) -> Result<JoinHandle<()>> {
    let task = async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for Ctrl-C");
                return;
            }
            info!("received Ctrl-C");
            if control.send(Control::Shutdown).await.is_err() {
                debug!("restart coordinator gone; signal listener exiting");
                return;
            }
        }
    };

    Ok(tokio::spawn(task.with_current_subscriber()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn sigusr2_becomes_a_restart_request() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = spawn_signal_listener(tx).unwrap();

        kill(Pid::this(), Signal::SIGUSR2).unwrap();

        let msg = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, Control::Restart);
        handle.abort();
    }
}
