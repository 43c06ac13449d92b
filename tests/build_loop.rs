// tests/build_loop.rs

use std::error::Error;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use kiln::errors::{KilnError, Result as KilnResult};
use kiln::restart::{Acquired, Control, FreshBind, HandoffFuture, ListenerHandoff};
use kiln::{Context, build_loop_controlled};
use kiln_test_utils::builders::TempSite;
use kiln_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Binds loopback, remembers the address, and "hands off" instantly.
#[derive(Clone, Default)]
struct LoopbackHandoff {
    addr: Arc<Mutex<Option<SocketAddr>>>,
    handoffs: Arc<AtomicUsize>,
}

impl ListenerHandoff for LoopbackHandoff {
    fn acquire(&self, _addr: SocketAddr) -> KilnResult<Acquired> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        *self.addr.lock().unwrap() = Some(listener.local_addr()?);
        Ok(Acquired {
            listener,
            inherited: false,
        })
    }

    fn notify_ready(&self) -> KilnResult<()> {
        Ok(())
    }

    fn hand_off<'a>(&'a self, listener: Option<&'a TcpListener>) -> HandoffFuture<'a> {
        Box::pin(async move {
            if listener.is_none() {
                return Err(KilnError::ListenerError("nothing to hand off".into()));
            }
            self.handoffs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

async fn wait_for(counter: &AtomicUsize, at_least: usize) {
    while counter.load(Ordering::SeqCst) < at_least {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_target(site: &TempSite, rel: &str, expected: &str) {
    while site.read_target(rel).as_deref() != Some(expected) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn finish_while_idle_reports_last_iteration_outcome() -> TestResult {
    with_timeout(async {
        init_tracing();

        for fail in [false, true] {
            let site = TempSite::new();
            let iterations = Arc::new(AtomicUsize::new(0));
            let seen = Arc::clone(&iterations);
            let (control_tx, control_rx) = mpsc::channel(4);

            let run = build_loop_controlled(
                site.config().build(),
                FreshBind,
                control_rx,
                move |_ctx: Context| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        if fail {
                            Err(anyhow!("broken build"))
                        } else {
                            Ok(())
                        }
                    }
                },
            );

            let stop = async {
                wait_for(&iterations, 1).await;
                control_tx.send(Control::Shutdown).await.unwrap();
            };

            let (outcome, ()) = tokio::join!(run, stop);
            assert_eq!(outcome?, !fail);
            assert_eq!(iterations.load(Ordering::SeqCst), 1);
        }
        Ok(())
    })
    .await
}

#[tokio::test]
async fn source_change_triggers_one_more_iteration() -> TestResult {
    with_timeout(async {
        init_tracing();
        let site = TempSite::new();
        site.write("index.html", "v1");

        let iterations = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&iterations);
        let (control_tx, control_rx) = mpsc::channel(4);

        let run = build_loop_controlled(
            site.config().build(),
            FreshBind,
            control_rx,
            move |ctx: Context| {
                seen.fetch_add(1, Ordering::SeqCst);
                kiln::mirror::mirror_tree(ctx)
            },
        );

        let drive = async {
            wait_for(&iterations, 1).await;
            site.write("index.html", "v2");
            site.touch("index.html", Duration::from_secs(2));
            wait_for(&iterations, 2).await;
            wait_for_target(&site, "index.html", "v2").await;
            control_tx.send(Control::Shutdown).await.unwrap();
        };

        let (outcome, ()) = tokio::join!(run, drive);
        assert!(outcome?);
        assert_eq!(site.read_target("index.html").as_deref(), Some("v2"));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn serves_target_and_finishes_after_hand_off() -> TestResult {
    with_timeout(async {
        init_tracing();
        let site = TempSite::new();
        site.write("hello.txt", "hello over http");

        let handoff = LoopbackHandoff::default();
        let probe = handoff.clone();
        let iterations = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&iterations);
        let (control_tx, control_rx) = mpsc::channel(4);

        let run = build_loop_controlled(
            site.config().port(0).build(),
            handoff,
            control_rx,
            move |ctx: Context| {
                seen.fetch_add(1, Ordering::SeqCst);
                kiln::mirror::mirror_tree(ctx)
            },
        );

        let drive = async {
            wait_for(&iterations, 1).await;
            wait_for_target(&site, "hello.txt", "hello over http").await;
            let addr = (*probe.addr.lock().unwrap()).expect("listener bound");

            let response = http_get(addr, "/hello.txt").await;
            assert!(response.starts_with("HTTP/1.1 200"), "{response}");
            assert!(response.ends_with("hello over http"));

            control_tx.send(Control::Restart).await.unwrap();
        };

        let (outcome, ()) = tokio::join!(run, drive);
        assert!(outcome?);
        assert_eq!(probe.handoffs.load(Ordering::SeqCst), 1);
        Ok(())
    })
    .await
}
