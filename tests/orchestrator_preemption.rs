// tests/orchestrator_preemption.rs
// Priority preemption, abort and at-most-once emission through the public
// orchestrator surface, driven by a deliberately slow mock loader.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use hillview_worker::auth::StaticTokenProvider;
use hillview_worker::error::SourceLoadError;
use hillview_worker::loader::{LoadContext, LoaderRegistry, SourceLoader};
use hillview_worker::{
    Bounds, ChannelSink, GeoPoint, Orchestrator, OrchestratorConfig, PhotoOps, PhotoRecord,
    SourceDescriptor, SourceKind, WorkerEvent, WorkerRequest,
};

struct SlowLoader {
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceLoader for SlowLoader {
    async fn load_photos(
        &self,
        source: &SourceDescriptor,
        _bounds: Option<&Bounds>,
        _limit: usize,
        ctx: &LoadContext,
    ) -> Result<Vec<PhotoRecord>, SourceLoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + self.delay;
        while tokio::time::Instant::now() < deadline {
            if ctx.cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(vec![PhotoRecord {
            id: format!("{}-photo", source.id),
            source_id: source.id.clone(),
            coord: GeoPoint { lat: 49.5, lng: 14.5 },
            bearing: 0.0,
            altitude: None,
            content_ref: "ref".into(),
            content_hash: None,
            captured_at: None,
        }])
    }
}

fn worker(delay_ms: u64) -> (Orchestrator, tokio::sync::mpsc::UnboundedReceiver<WorkerEvent>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = LoaderRegistry::new();
    registry.register(
        SourceKind::Device,
        Arc::new(SlowLoader { delay: Duration::from_millis(delay_ms), calls: calls.clone() }),
    );
    let ops = PhotoOps::new(registry, StaticTokenProvider::new(None), 1_000);
    let (sink, rx) = ChannelSink::new();
    let orchestrator = Orchestrator::new(ops, Arc::new(sink), &OrchestratorConfig::default());
    (orchestrator, rx, calls)
}

fn source(id: &str) -> SourceDescriptor {
    SourceDescriptor {
        id: id.into(),
        kind: SourceKind::Device,
        enabled: true,
        priority_rank: 0,
        endpoint_url: None,
    }
}

fn bounds() -> Bounds {
    Bounds {
        top_left: GeoPoint { lat: 50.0, lng: 14.0 },
        bottom_right: GeoPoint { lat: 49.0, lng: 15.0 },
    }
}

fn area(process_id: &str, priority: u32, source_id: &str) -> WorkerRequest {
    WorkerRequest::AreaUpdate {
        process_id: process_id.into(),
        priority,
        sources: vec![source(source_id)],
        bounds: bounds(),
        max_photos: 10,
        range: None,
    }
}

#[tokio::test]
async fn higher_precedence_request_preempts_and_suppresses_event() {
    let (orchestrator, mut rx, _calls) = worker(200);

    orchestrator.submit(area("slow", 1, "a"));
    tokio::time::sleep(Duration::from_millis(40)).await;
    orchestrator.submit(area("fast", 5, "b"));

    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.process_id(), "fast");

    // The preempted process must stay silent.
    assert!(timeout(Duration::from_millis(400), rx.recv()).await.is_err());
    assert_eq!(orchestrator.live_process_count(), 0);
}

#[tokio::test]
async fn equal_priority_processes_coexist() {
    let (orchestrator, mut rx, _calls) = worker(50);

    orchestrator.submit(area("p1", 5, "a"));
    orchestrator.submit(area("p2", 5, "b"));

    let mut seen = Vec::new();
    for _ in 0..2 {
        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        seen.push(event.process_id().to_string());
    }
    seen.sort();
    assert_eq!(seen, ["p1", "p2"]);
}

#[tokio::test]
async fn resubmitted_process_id_replaces_the_live_process() {
    let (orchestrator, mut rx, _calls) = worker(150);

    orchestrator.submit(area("same", 5, "a"));
    tokio::time::sleep(Duration::from_millis(30)).await;
    orchestrator.submit(area("same", 5, "b"));

    let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.process_id(), "same");
    // Exactly one event for the id, from the replacement only.
    match &event {
        WorkerEvent::PhotosUpdate { source_breakdown, .. } => {
            assert!(source_breakdown.contains_key("b"));
            assert!(!source_breakdown.contains_key("a"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
}

#[tokio::test]
async fn aborted_process_emits_nothing() {
    let (orchestrator, mut rx, _calls) = worker(150);

    orchestrator.submit(area("doomed", 3, "a"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    orchestrator.abort("doomed");
    // Aborting an unknown id is a no-op.
    orchestrator.abort("doomed");
    orchestrator.abort("never-existed");

    assert!(timeout(Duration::from_millis(400), rx.recv()).await.is_err());
    assert_eq!(orchestrator.live_process_count(), 0);
}

#[tokio::test]
async fn malformed_envelope_yields_one_error_event_and_no_record() {
    let (orchestrator, mut rx, calls) = worker(50);

    orchestrator.submit_json(r#"{"type": "areaUpdate", "processId": "bad", "priority": 1, "data": null}"#);

    let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    match event {
        WorkerEvent::Error { process_id, .. } => assert_eq!(process_id, "bad"),
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(orchestrator.live_process_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cleanup_cancels_everything_in_flight() {
    let (orchestrator, mut rx, _calls) = worker(200);

    orchestrator.submit(area("x", 2, "a"));
    orchestrator.submit(area("y", 2, "b"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    orchestrator.submit(WorkerRequest::Cleanup);

    assert_eq!(orchestrator.live_process_count(), 0);
    assert!(timeout(Duration::from_millis(400), rx.recv()).await.is_err());
}

#[tokio::test]
async fn submission_after_cleanup_leaves_no_record_behind() {
    let (orchestrator, mut rx, calls) = worker(50);

    orchestrator.submit(WorkerRequest::Cleanup);
    orchestrator.submit(area("late", 2, "a"));

    // The dropped process never runs, never emits and never lingers in the
    // table.
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
    assert_eq!(orchestrator.live_process_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
