// src/restart/process.rs

//! Listener hand-off between process generations on Unix.
//!
//! The parent clears close-on-exec on its listening socket, re-executes the
//! current binary with the same arguments and advertises the descriptor in
//! [`LISTEN_FD_ENV`] and its own pid in [`PARENT_PID_ENV`]. The successor
//! adopts the descriptor instead of binding, starts serving, and sends
//! `SIGUSR1` to the parent. The parent only lets go of the socket after that.

use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::sync::{Mutex, PoisonError};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

use super::{Acquired, FreshBind, HandoffFuture, ListenerHandoff};
use crate::errors::{KilnError, Result};

/// Descriptor number of the inherited listening socket.
pub const LISTEN_FD_ENV: &str = "KILN_LISTEN_FD";

/// Pid of the process waiting for the readiness signal.
pub const PARENT_PID_ENV: &str = "KILN_PARENT_PID";

#[derive(Debug)]
pub struct ProcessHandoff {
    /// Taken on first `acquire`; the descriptor can only be adopted once.
    inherited_fd: Mutex<Option<RawFd>>,
    parent: Option<u32>,
}

impl ProcessHandoff {
    /// Read the inherited descriptor and parent pid from the environment.
    pub fn from_env() -> Result<Self> {
        let fd = std::env::var(LISTEN_FD_ENV).ok();
        let parent = std::env::var(PARENT_PID_ENV).ok();
        Self::from_vars(fd.as_deref(), parent.as_deref())
    }

    pub(crate) fn from_vars(fd: Option<&str>, parent: Option<&str>) -> Result<Self> {
        let inherited_fd = fd
            .map(|raw| {
                raw.trim().parse::<RawFd>().map_err(|_| {
                    KilnError::ListenerError(format!("invalid {LISTEN_FD_ENV} value {raw:?}"))
                })
            })
            .transpose()?;
        let parent = parent
            .map(|raw| {
                raw.trim().parse::<u32>().map_err(|_| {
                    KilnError::ListenerError(format!("invalid {PARENT_PID_ENV} value {raw:?}"))
                })
            })
            .transpose()?;

        Ok(Self {
            inherited_fd: Mutex::new(inherited_fd),
            parent,
        })
    }

    /// True if a descriptor was advertised and not yet adopted.
    #[cfg(test)]
    fn has_inherited(&self) -> bool {
        self.inherited_fd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl ListenerHandoff for ProcessHandoff {
    fn acquire(&self, addr: SocketAddr) -> Result<Acquired> {
        let fd = self
            .inherited_fd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(fd) = fd else {
            return FreshBind.acquire(addr);
        };

        // The descriptor was placed in this process by our parent for exactly
        // this purpose and nothing else owns it.
        let listener = unsafe { TcpListener::from_raw_fd(fd) };
        // Don't leak it into unrelated children; hand_off clears this again.
        set_cloexec(fd, true)?;

        let local = listener.local_addr()?;
        info!(fd, %local, "inherited listener from previous process");
        Ok(Acquired {
            listener,
            inherited: true,
        })
    }

    fn notify_ready(&self) -> Result<()> {
        let Some(expected) = self.parent else {
            return Ok(());
        };

        // If the parent already died we've been re-parented; don't signal
        // whatever now owns that pid.
        let actual = std::os::unix::process::parent_id();
        if actual != expected {
            warn!(expected, actual, "parent process changed; not signalling readiness");
            return Ok(());
        }

        let pid = i32::try_from(expected)
            .map_err(|_| KilnError::ListenerError(format!("parent pid {expected} out of range")))?;
        kill(Pid::from_raw(pid), Signal::SIGUSR1)
            .map_err(|err| KilnError::ListenerError(format!("signalling parent {pid}: {err}")))?;
        debug!(parent = pid, "signalled readiness to parent");
        Ok(())
    }

    fn hand_off<'a>(&'a self, listener: Option<&'a TcpListener>) -> HandoffFuture<'a> {
        Box::pin(async move {
            // Registered before the successor exists so its signal can't race us.
            let mut ready = signal(SignalKind::user_defined1())?;

            let exe = std::env::current_exe()?;
            let mut cmd = tokio::process::Command::new(&exe);
            cmd.args(std::env::args_os().skip(1))
                .env(PARENT_PID_ENV, std::process::id().to_string())
                .env_remove(LISTEN_FD_ENV);

            let fd = listener.map(AsRawFd::as_raw_fd);
            if let Some(fd) = fd {
                set_cloexec(fd, false)?;
                cmd.env(LISTEN_FD_ENV, fd.to_string());
            }

            let spawned = cmd.spawn();
            if let Some(fd) = fd {
                set_cloexec(fd, true)?;
            }
            let mut child = spawned
                .map_err(|err| KilnError::ListenerError(format!("starting {exe:?}: {err}")))?;

            info!(pid = ?child.id(), "started successor; waiting for readiness");

            tokio::select! {
                _ = ready.recv() => Ok(()),
                status = child.wait() => {
                    let status = status?;
                    Err(KilnError::ListenerError(format!(
                        "successor exited before becoming ready ({status})"
                    )))
                }
            }
        })
    }
}

fn set_cloexec(fd: RawFd, on: bool) -> Result<()> {
    let flags = if on {
        FdFlag::FD_CLOEXEC
    } else {
        FdFlag::empty()
    };
    fcntl(fd, FcntlArg::F_SETFD(flags))
        .map_err(|err| KilnError::ListenerError(format!("fcntl on fd {fd}: {err}")))?;
    Ok(())
}
