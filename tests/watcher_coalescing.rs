// tests/watcher_coalescing.rs

use std::error::Error;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use kiln::watch::{spawn_watcher, EventFilter};
use kiln_test_utils::builders::TempSite;
use kiln_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn burst_of_writes_requests_a_single_rebuild() -> TestResult {
    with_timeout(async {
        init_tracing();
        let site = TempSite::new();

        let (rebuild_tx, mut rebuild_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::channel(1);
        let filter = EventFilter::new(&site.source(), &site.target(), &[])?;
        let _watcher = spawn_watcher(site.source(), filter, rebuild_tx, done_rx)?;

        for i in 0..20 {
            site.write(&format!("page-{i}.md"), "draft");
        }

        rebuild_rx.recv().await.expect("first rebuild request");
        assert!(
            timeout(Duration::from_millis(300), rebuild_rx.recv())
                .await
                .is_err(),
            "burst must coalesce into one request"
        );

        // Once acknowledged, the next change triggers again.
        done_tx.send(()).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        site.write("page-0.md", "final");
        rebuild_rx.recv().await.expect("second rebuild request");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn ignored_paths_never_request_a_rebuild() -> TestResult {
    with_timeout(async {
        init_tracing();
        let site = TempSite::new();

        std::fs::create_dir_all(site.source().join("drafts"))?;

        let (rebuild_tx, mut rebuild_rx) = mpsc::channel(1);
        let (_done_tx, done_rx) = mpsc::channel(1);
        let filter = EventFilter::new(&site.source(), &site.target(), &["drafts/**".to_string()])?;
        let _watcher = spawn_watcher(site.source(), filter, rebuild_tx, done_rx)?;

        site.write("drafts/wip.md", "not yet");
        assert!(
            timeout(Duration::from_millis(300), rebuild_rx.recv())
                .await
                .is_err(),
            "ignored path must not trigger"
        );

        site.write("index.md", "published");
        rebuild_rx.recv().await.expect("rebuild for a watched path");
        Ok(())
    })
    .await
}
