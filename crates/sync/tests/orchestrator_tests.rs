mod common;

use common::{
    FakeRemote, FixedTransport, HangingTransport, Harness, MemorySource, StallingIndex,
    can_bind_localhost, drain,
};
use httpmock::prelude::*;
use photosync_client::RemoteObjectStore;
use photosync_core::session::{
    STATUS_CANCELLED, STATUS_NO_ACCESS, STATUS_NOT_CONFIGURED, STATUS_NOTHING,
};
use photosync_core::{ItemId, TriggerKind};
use photosync_storage::MemoryDedupIndex;
use photosync_sync::{HttpTransport, SourceAccess};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn abc_source() -> Arc<MemorySource> {
    Arc::new(
        MemorySource::new()
            .with_photo("A")
            .with_photo("B")
            .with_photo("C"),
    )
}

#[tokio::test]
async fn queues_new_items_and_marks_remote_duplicates() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com").with_stored(b"B"));
    let transport = Arc::new(FixedTransport::ok());
    let h = Harness::new(Some(remote.clone()), abc_source(), transport.clone());

    let session = h
        .orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;

    assert_eq!(session.queued, 2);
    assert_eq!(session.already_exists, 1);
    assert_eq!(session.failed, 0);
    assert!(!session.running);
    assert_eq!(session.status, "Queued 2 upload(s)");
    assert!(session.last_run_at.is_some());
    // B is marked as soon as the exists check says so.
    assert!(h.index.is_marked(&ItemId::new("B")).await);

    drain(&h).await;
    assert_eq!(transport.calls(), 2);
    assert!(h.index.is_marked(&ItemId::new("A")).await);
    assert!(h.index.is_marked(&ItemId::new("C")).await);
    assert_eq!(h.orchestrator.state().snapshot().uploaded, 2);
    assert_eq!(h.payload_count(), 0);
    assert!(h.jobs.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn presign_failure_skips_only_that_item() {
    let remote = Arc::new(
        FakeRemote::new("https://bucket.example.com")
            .with_stored(b"B")
            .failing_presign_for("A.JPG"),
    );
    let h = Harness::new(
        Some(remote.clone()),
        abc_source(),
        Arc::new(FixedTransport::ok()),
    );

    let session = h
        .orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;

    assert_eq!(session.queued, 1);
    assert_eq!(session.failed, 1);
    assert_eq!(session.already_exists, 1);
    assert_eq!(session.status, "Queued 1 upload(s)");

    drain(&h).await;
    assert!(h.index.is_marked(&ItemId::new("C")).await);
    assert!(!h.index.is_marked(&ItemId::new("A")).await);
    // The failed item's payload was cleaned up by the orchestrator.
    assert_eq!(h.payload_count(), 0);
}

#[tokio::test]
async fn exists_failure_skips_item_without_presign() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com").failing_exists_for(b"A"));
    let transport = Arc::new(FixedTransport::ok());
    let h = Harness::new(Some(remote.clone()), abc_source(), transport.clone());

    let session = h
        .orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;

    assert_eq!(session.queued, 2);
    assert_eq!(session.failed, 1);
    assert_eq!(session.already_exists, 0);
    assert_eq!(remote.exists_calls(), 3);
    // A failed check is not "absent": A is never presigned.
    let presigned: Vec<_> = remote
        .presigned()
        .into_iter()
        .filter_map(|request| request.filename)
        .collect();
    assert_eq!(presigned.len(), 2);
    assert!(!presigned.contains(&"A.JPG".to_string()));

    drain(&h).await;
    assert_eq!(transport.calls(), 2);
    assert!(!h.index.is_marked(&ItemId::new("A")).await);
    assert!(h.index.is_marked(&ItemId::new("B")).await);
    assert!(h.index.is_marked(&ItemId::new("C")).await);
    assert_eq!(h.payload_count(), 0);
}

#[tokio::test]
async fn presign_carries_capture_time_and_filename() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com"));
    let source = Arc::new(MemorySource::new().with_photo("IMG_0042"));
    let h = Harness::new(
        Some(remote.clone()),
        source.clone(),
        Arc::new(FixedTransport::ok()),
    );

    h.orchestrator
        .run(1, TriggerKind::Manual, &CancellationToken::new())
        .await;

    let requests = remote.presigned();
    assert_eq!(requests.len(), 1);
    let item = source.item("IMG_0042");
    assert_eq!(requests[0].filename.as_deref(), Some("IMG_0042.JPG"));
    assert_eq!(requests[0].created_ms, Some(item.created_epoch_ms()));
    assert_eq!(requests[0].content_type, "image/jpeg");
    assert!(
        requests[0]
            .key
            .as_str()
            .starts_with("photos/by-hash/")
    );
    assert!(requests[0].key.as_str().ends_with(".jpg"));
}

#[tokio::test]
async fn failed_put_leaves_item_unmarked() {
    if !can_bind_localhost() {
        eprintln!("skipping: cannot bind localhost");
        return;
    }
    let server = MockServer::start_async().await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT).path_contains("/photos/by-hash/");
            then.status(500).body("storage unavailable");
        })
        .await;

    let remote = Arc::new(FakeRemote::new(&server.base_url()));
    let source = Arc::new(MemorySource::new().with_photo("A"));
    let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());
    let h = Harness::new(Some(remote.clone()), source, transport);

    let session = h
        .orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;
    assert_eq!(session.queued, 1);

    drain(&h).await;
    put.assert_async().await;
    assert!(!h.index.is_marked(&ItemId::new("A")).await);
    assert_eq!(h.orchestrator.state().snapshot().uploaded, 0);
    assert_eq!(h.payload_count(), 0);

    // The next run evaluates the item again.
    h.orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;
    assert_eq!(remote.exists_calls(), 2);
}

#[tokio::test]
async fn successful_put_sends_presigned_headers() {
    if !can_bind_localhost() {
        eprintln!("skipping: cannot bind localhost");
        return;
    }
    let server = MockServer::start_async().await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path_contains("/photos/by-hash/")
                .header("x-amz-meta-filename", "A.JPG")
                .header("content-type", "image/jpeg")
                .body("A");
            then.status(200);
        })
        .await;

    let remote = Arc::new(FakeRemote::new(&server.base_url()));
    let source = Arc::new(MemorySource::new().with_photo("A"));
    let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());
    let h = Harness::new(Some(remote), source, transport);

    h.orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;
    drain(&h).await;

    put.assert_async().await;
    assert!(h.index.is_marked(&ItemId::new("A")).await);
}

#[tokio::test]
async fn fully_marked_library_makes_no_network_calls() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com"));
    let index = Arc::new(MemoryDedupIndex::with_marked(
        ["A", "B", "C"].into_iter().map(ItemId::new),
    ));
    let transport = Arc::new(FixedTransport::ok());
    let h = Harness::with_index(
        Some(remote.clone()),
        abc_source(),
        transport.clone(),
        index,
    );

    let session = h
        .orchestrator
        .run(10, TriggerKind::BackgroundRefresh, &CancellationToken::new())
        .await;

    assert_eq!(session.status, STATUS_NOTHING);
    assert_eq!(session.queued, 0);
    assert_eq!(remote.total_calls(), 0);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn limit_caps_items_considered() {
    let source = Arc::new(
        (0..5).fold(MemorySource::new(), |source, i| {
            source.with_photo(&format!("P{i}"))
        }),
    );
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com"));
    let h = Harness::new(
        Some(remote.clone()),
        source,
        Arc::new(FixedTransport::ok()),
    );

    let session = h
        .orchestrator
        .run(2, TriggerKind::Manual, &CancellationToken::new())
        .await;

    assert_eq!(session.queued, 2);
    assert_eq!(remote.exists_calls(), 2);
    drain(&h).await;
    // Newest first.
    assert!(h.index.is_marked(&ItemId::new("P0")).await);
    assert!(h.index.is_marked(&ItemId::new("P1")).await);
    assert!(!h.index.is_marked(&ItemId::new("P2")).await);
}

#[tokio::test]
async fn missing_remote_stops_before_scanning() {
    let h = Harness::new(None, abc_source(), Arc::new(FixedTransport::ok()));

    let session = h
        .orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;

    assert_eq!(session.status, STATUS_NOT_CONFIGURED);
    assert!(!session.running);
    assert_eq!(session.queued, 0);
}

#[tokio::test]
async fn limited_access_is_reported() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com"));
    let source = Arc::new(
        MemorySource::new()
            .with_photo("A")
            .with_access(SourceAccess::Limited),
    );
    let h = Harness::new(
        Some(remote.clone() as Arc<dyn RemoteObjectStore>),
        source,
        Arc::new(FixedTransport::ok()),
    );

    let session = h
        .orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;

    assert_eq!(session.status, STATUS_NO_ACCESS);
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn cancelled_run_processes_nothing() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com"));
    let h = Harness::new(
        Some(remote.clone()),
        abc_source(),
        Arc::new(FixedTransport::ok()),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let session = h.orchestrator.run(10, TriggerKind::Manual, &cancel).await;

    assert_eq!(session.status, STATUS_CANCELLED);
    assert_eq!(session.queued, 0);
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn cancellation_mid_run_cleans_up_payloads() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com"));
    let source = Arc::new(MemorySource::new().with_photo("A").hanging_export());
    let h = Harness::new(Some(remote.clone()), source, Arc::new(FixedTransport::ok()));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let session = tokio::time::timeout(
        Duration::from_secs(5),
        h.orchestrator.run(10, TriggerKind::Manual, &cancel),
    )
    .await
    .unwrap();

    assert_eq!(session.status, STATUS_CANCELLED);
    assert_eq!(session.queued, 0);
    assert_eq!(remote.total_calls(), 0);
    assert_eq!(h.payload_count(), 0);
}

#[tokio::test]
async fn state_subscribers_see_run_finish() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com"));
    let h = Harness::new(Some(remote), abc_source(), Arc::new(FixedTransport::ok()));
    let mut rx = h.orchestrator.state().subscribe();

    h.orchestrator
        .run(10, TriggerKind::LibraryChange, &CancellationToken::new())
        .await;

    let session = rx.borrow_and_update().clone();
    assert_eq!(session.trigger, TriggerKind::LibraryChange);
    assert!(!session.running);
    assert_eq!(session.queued, 3);
}

#[tokio::test]
async fn aborted_run_payloads_are_reclaimed_next_run() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com").with_stored(b"A"));
    let source = Arc::new(MemorySource::new().with_photo("A"));
    let index = Arc::new(StallingIndex::new());
    let h = Harness::with_index(
        Some(remote),
        source,
        Arc::new(FixedTransport::ok()),
        index.clone(),
    );

    // The first run stalls marking A and is aborted with its export on disk.
    let orchestrator = h.orchestrator.clone();
    let run = tokio::spawn(async move {
        orchestrator
            .run(10, TriggerKind::Manual, &CancellationToken::new())
            .await
    });
    tokio::time::timeout(Duration::from_secs(5), async {
        while !index.has_stalled() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run never reached the index");
    run.abort();
    assert!(run.await.unwrap_err().is_cancelled());
    assert_eq!(h.payload_count(), 1);

    let session = h
        .orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;
    assert_eq!(session.already_exists, 1);
    assert!(h.index.is_marked(&ItemId::new("A")).await);
    assert_eq!(h.payload_count(), 0);
}

#[tokio::test]
async fn payload_sweep_keeps_pending_transfers() {
    let remote = Arc::new(FakeRemote::new("https://bucket.example.com"));
    let source = Arc::new(MemorySource::new().with_photo("A"));
    let h = Harness::new(Some(remote), source, Arc::new(HangingTransport));

    let session = h
        .orchestrator
        .run(10, TriggerKind::Manual, &CancellationToken::new())
        .await;
    assert_eq!(session.queued, 1);
    let pending = h.jobs.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);

    let stray = h.payload_dir().join("stray.jpg");
    std::fs::write(&stray, b"left behind").unwrap();
    assert_eq!(h.payload_count(), 2);

    h.orchestrator
        .run(0, TriggerKind::Manual, &CancellationToken::new())
        .await;
    assert!(!stray.exists());
    assert!(pending[0].payload_path.exists());
    assert_eq!(h.payload_count(), 1);

    h.engine.expire().await;
    drain(&h).await;
    assert_eq!(h.payload_count(), 0);
}
