// src/restart/mod.rs

//! Listener continuity across process restarts.
//!
//! In loop mode the target directory is served over a listening socket that
//! must survive restarts of the tool itself. On a restart request the current
//! process starts a successor, passes it the listener and waits until the
//! successor reports that it is serving. Only then does it release the socket
//! and tell the build loop to finish, so no connection attempt is refused.
//!
//! - [`ListenerHandoff`] abstracts how a listener is acquired, inherited and
//!   passed on. [`process::ProcessHandoff`] is the Unix implementation;
//!   [`FreshBind`] never inherits and can't hand off.
//! - [`RestartCoordinator`] reacts to [`Control`] messages.
//! - [`signals::spawn_signal_listener`] turns OS signals into [`Control`]s.
//! - [`serve`] serves the target directory over HTTP.

#[cfg(unix)]
pub mod process;
pub mod serve;
pub mod signals;

use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::errors::{KilnError, Result};

#[cfg(unix)]
pub use process::ProcessHandoff;
pub use serve::spawn_server;
pub use signals::spawn_signal_listener;

/// Future returned by [`ListenerHandoff::hand_off`].
pub type HandoffFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A listener together with where it came from.
#[derive(Debug)]
pub struct Acquired {
    pub listener: TcpListener,
    /// True if the listener was passed down by a previous process.
    pub inherited: bool,
}

/// How a process gets its listener and passes it on.
pub trait ListenerHandoff: Send + Sync + 'static {
    /// Inherit a listener from the parent process, or bind `addr`.
    fn acquire(&self, addr: SocketAddr) -> Result<Acquired>;

    /// Tell the parent process (if any) that this one is ready to serve.
    fn notify_ready(&self) -> Result<()>;

    /// Start a successor holding `listener` and resolve once it is ready.
    fn hand_off<'a>(&'a self, listener: Option<&'a TcpListener>) -> HandoffFuture<'a>;
}

/// Always binds a new listener; restarts are unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreshBind;

impl ListenerHandoff for FreshBind {
    fn acquire(&self, addr: SocketAddr) -> Result<Acquired> {
        let listener = TcpListener::bind(addr)
            .map_err(|err| KilnError::ListenerError(format!("binding {addr}: {err}")))?;
        Ok(Acquired {
            listener,
            inherited: false,
        })
    }

    fn notify_ready(&self) -> Result<()> {
        Ok(())
    }

    fn hand_off<'a>(&'a self, _listener: Option<&'a TcpListener>) -> HandoffFuture<'a> {
        Box::pin(async {
            Err(KilnError::ListenerError(
                "restart is not supported on this platform".to_string(),
            ))
        })
    }
}

/// Requests the restart coordinator reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Hand the listener to a successor, then finish.
    Restart,
    /// Finish without a successor.
    Shutdown,
}

/// Owns the serving listener and decides when the build loop finishes.
pub struct RestartCoordinator<H> {
    handoff: H,
    listener: Option<TcpListener>,
    server: Option<JoinHandle<()>>,
}

impl<H> std::fmt::Debug for RestartCoordinator<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartCoordinator")
            .field("listener", &self.listener)
            .field("serving", &self.server.is_some())
            .finish_non_exhaustive()
    }
}

impl<H: ListenerHandoff> RestartCoordinator<H> {
    pub fn new(handoff: H, listener: Option<TcpListener>, server: Option<JoinHandle<()>>) -> Self {
        Self {
            handoff,
            listener,
            server,
        }
    }

    /// Process control messages until one of them ends this process's
    /// generation, then release the listener and raise `finish`.
    ///
    /// A failed hand-off is logged and the current process keeps serving.
    pub async fn run(mut self, mut control: mpsc::Receiver<Control>, finish: mpsc::Sender<()>) {
        while let Some(msg) = control.recv().await {
            match msg {
                Control::Shutdown => {
                    info!("shutdown requested");
                    break;
                }
                Control::Restart => {
                    info!("restart requested; handing listener to successor");
                    match self.handoff.hand_off(self.listener.as_ref()).await {
                        Ok(()) => {
                            info!("successor is ready; releasing listener");
                            break;
                        }
                        Err(err) => {
                            error!(error = %err, "restart failed; continuing to serve");
                        }
                    }
                }
            }
        }

        self.release();
        if finish.send(()).await.is_err() {
            debug!("build loop already finished");
        }
    }

    fn release(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
        self.listener = None;
    }
}
