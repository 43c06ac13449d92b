// src/watch/coalesce.rs

//! Turns a stream of raw filesystem events into rebuild requests.
//!
//! The first qualifying event sends one rebuild request. Everything that
//! arrives after it is discarded until the build loop acknowledges that the
//! rebuild finished, so a burst of saves produces exactly one rebuild.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::watch::patterns::EventFilter;

pub async fn coalesce_events(
    mut events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    filter: EventFilter,
    rebuild: mpsc::Sender<()>,
    mut rebuild_done: mpsc::Receiver<()>,
) {
    while let Some(res) = events.recv().await {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                error!(error = %err, "error from watcher");
                continue;
            }
        };

        debug!(?event, "received event from watcher");

        let Some(trigger) = filter.first_qualifying(&event) else {
            continue;
        };

        info!(path = ?trigger.path, op = ?trigger.op, "change detected; requesting rebuild");
        if rebuild.send(()).await.is_err() {
            debug!("build loop stopped listening; watcher exiting");
            return;
        }

        // Drain until the rebuild is acknowledged.
        loop {
            tokio::select! {
                done = rebuild_done.recv() => {
                    if done.is_none() {
                        debug!("rebuild acknowledgement channel closed; watcher exiting");
                        return;
                    }
                    break;
                }
                next = events.recv() => match next {
                    Some(Ok(event)) => debug!(?event, "discarding event during rebuild"),
                    Some(Err(err)) => error!(error = %err, "error from watcher"),
                    None => return,
                },
            }
        }
    }

    debug!("watcher event stream finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, EventKind, ModifyKind};
    use std::path::Path;
    use std::time::Duration;
    use tokio::time::timeout;

    fn write_event(path: &Path) -> notify::Result<notify::Event> {
        Ok(
            notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
                .add_path(path.to_path_buf()),
        )
    }

    struct Harness {
        events: mpsc::UnboundedSender<notify::Result<notify::Event>>,
        rebuild: mpsc::Receiver<()>,
        done: mpsc::Sender<()>,
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
    }

    fn start() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let filter = EventFilter::new(&root, &root.join("public"), &[]).unwrap();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (rebuild_tx, rebuild_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::channel(1);
        tokio::spawn(coalesce_events(events_rx, filter, rebuild_tx, done_rx));

        Harness {
            events: events_tx,
            rebuild: rebuild_rx,
            done: done_tx,
            _dir: dir,
            root,
        }
    }

    async fn assert_no_rebuild(rx: &mut mpsc::Receiver<()>) {
        assert!(
            timeout(Duration::from_millis(100), rx.recv()).await.is_err(),
            "unexpected rebuild request"
        );
    }

    #[tokio::test]
    async fn burst_of_events_triggers_one_rebuild() {
        let mut h = start();

        for i in 0..10 {
            h.events
                .send(write_event(&h.root.join(format!("post-{i}.md"))))
                .unwrap();
        }

        timeout(Duration::from_secs(2), h.rebuild.recv())
            .await
            .unwrap()
            .unwrap();
        assert_no_rebuild(&mut h.rebuild).await;
    }

    #[tokio::test]
    async fn listening_resumes_after_acknowledgement() {
        let mut h = start();

        h.events.send(write_event(&h.root.join("a.md"))).unwrap();
        timeout(Duration::from_secs(2), h.rebuild.recv())
            .await
            .unwrap()
            .unwrap();

        h.done.send(()).await.unwrap();
        h.events.send(write_event(&h.root.join("b.md"))).unwrap();

        timeout(Duration::from_secs(2), h.rebuild.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn filtered_events_and_errors_trigger_nothing() {
        let mut h = start();

        h.events
            .send(Ok(notify::Event::new(EventKind::Create(CreateKind::File))
                .add_path(h.root.join("file.txt~"))))
            .unwrap();
        h.events
            .send(Ok(notify::Event::new(EventKind::Access(AccessKind::Any))
                .add_path(h.root.join("file.txt"))))
            .unwrap();
        h.events
            .send(Err(notify::Error::generic("inotify queue overflow")))
            .unwrap();

        assert_no_rebuild(&mut h.rebuild).await;

        // Errors don't stop watching.
        h.events.send(write_event(&h.root.join("file.txt"))).unwrap();
        timeout(Duration::from_secs(2), h.rebuild.recv())
            .await
            .unwrap()
            .unwrap();
    }
}
