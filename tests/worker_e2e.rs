// tests/worker_e2e.rs
// Envelope in, event out: a full area update through parsing, orchestration,
// device + stream loading, grid culling and range culling.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use hillview_worker::auth::StaticTokenProvider;
use hillview_worker::error::SourceLoadError;
use hillview_worker::loader::{LoaderRegistry, PhotoMetadataStore, StreamLoader};
use hillview_worker::{
    ChannelSink, GeoPoint, Orchestrator, OrchestratorConfig, PhotoOps, PhotoRecord, SourceKind,
    WorkerEvent,
};

struct FixedStore(Vec<PhotoRecord>);

impl PhotoMetadataStore for FixedStore {
    fn enumerate_photos(&self) -> Result<Vec<PhotoRecord>, SourceLoadError> {
        Ok(self.0.clone())
    }
}

fn photo(id: &str, lat: f64, lng: f64) -> PhotoRecord {
    PhotoRecord {
        id: id.into(),
        source_id: String::new(),
        coord: GeoPoint { lat, lng },
        bearing: 45.0,
        altitude: Some(320.0),
        content_ref: format!("file:///{id}.jpg"),
        content_hash: None,
        captured_at: Some(1_700_000_000),
    }
}

#[tokio::test]
async fn area_update_merges_sources_and_culls() {
    // Device photos clustered near the center, stream photos to the south.
    let store = Arc::new(FixedStore(vec![
        photo("d1", 49.55, 14.50),
        photo("d2", 49.56, 14.51),
        photo("d3", 49.10, 14.90),
    ]));
    let stream_frames = vec![
        concat!(
            "data: {\"type\":\"photos\",\"photos\":[",
            "{\"id\":\"s1\",\"sourceId\":\"\",\"coord\":{\"lat\":49.2,\"lng\":14.2},\"bearing\":0.0,\"contentRef\":\"r1\"},",
            "{\"id\":\"s2\",\"sourceId\":\"\",\"coord\":{\"lat\":49.9,\"lng\":14.9},\"bearing\":0.0,\"contentRef\":\"r2\"}",
            "]}\n\n",
        )
        .to_string(),
        "data: {\"type\":\"stream_complete\"}\n\n".to_string(),
    ];

    let mut registry = LoaderRegistry::new();
    registry.register(
        SourceKind::Device,
        Arc::new(hillview_worker::loader::DeviceLoader::new(store)),
    );
    registry.register(SourceKind::Stream, Arc::new(StreamLoader::from_fixture(stream_frames)));

    let ops = PhotoOps::new(registry, StaticTokenProvider::new(None), 1_000);
    let (sink, mut rx) = ChannelSink::new();
    let orchestrator = Orchestrator::new(ops, Arc::new(sink), &OrchestratorConfig::default());

    orchestrator.submit_json(
        r#"{
            "type": "areaUpdate",
            "messageId": "m-1",
            "processId": "viewport-42",
            "priority": 0,
            "data": {
                "sources": [
                    {"id": "device", "kind": "device", "enabled": true, "priorityRank": 0},
                    {"id": "hillview", "kind": "stream", "enabled": true, "priorityRank": 1,
                     "endpointUrl": "https://photos.example/api/stream"}
                ],
                "bounds": {
                    "topLeft": {"lat": 50.0, "lng": 14.0},
                    "bottomRight": {"lat": 49.0, "lng": 15.0}
                },
                "maxPhotos": 100,
                "range": {
                    "center": {"lat": 49.55, "lng": 14.50},
                    "radiusM": 5000.0,
                    "maxPhotos": 2
                }
            }
        }"#,
    );

    let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    match event {
        WorkerEvent::PhotosUpdate {
            process_id,
            photos_in_area,
            photos_in_range,
            source_breakdown,
            timestamp,
        } => {
            assert_eq!(process_id, "viewport-42");
            assert_eq!(photos_in_area.len(), 5);
            assert_eq!(source_breakdown["device"], 3);
            assert_eq!(source_breakdown["hillview"], 2);
            assert!(timestamp > 0);
            // d1 sits on the range center; d2 is ~1.3 km away; everything else
            // is outside the 5 km radius.
            let range_ids: Vec<&str> = photos_in_range.iter().map(|p| p.id.as_str()).collect();
            assert_eq!(range_ids, ["d1", "d2"]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(orchestrator.live_process_count(), 0);
}
