use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use chrono::Utc;
use cliprelay::adapters::local::{router, AppState, HttpClipSource, MemoryQueue};
use cliprelay::application::delivery::DeliveryService;
use cliprelay::application::registry::SourceRegistry;
use cliprelay::application::worker::WorkerActivity;
use cliprelay::domain::jobs::{ProcessedClip, ResultSummary};
use cliprelay::domain::reassembly::ReassemblerLimits;
use cliprelay::ports::delivery::ClipSource;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn state() -> (AppState, Arc<SourceRegistry>) {
    let shutdown = CancellationToken::new();
    let registry = Arc::new(SourceRegistry::new(&["cam-1".to_string()], 10));
    let queue = Arc::new(MemoryQueue::new(4, shutdown.clone()));
    let delivery = DeliveryService::new(
        registry.clone(),
        queue.clone(),
        Arc::new(WorkerActivity::default()),
        3,
    );
    let state = AppState {
        registry: registry.clone(),
        queue,
        delivery,
        limits: ReassemblerLimits::default(),
        enqueue_timeout: Duration::from_millis(100),
        content_type: String::from("video/mp4"),
        shutdown,
    };
    (state, registry)
}

fn processed(clip_number: u64) -> ProcessedClip {
    ProcessedClip {
        source: "cam-1".to_string(),
        clip_number,
        payload: Bytes::from(format!("clip-{}", clip_number)),
        annotated: true,
        duration: 10.5,
        size: 6,
        processing_time: Duration::from_millis(40),
        completed_at: Utc::now(),
        summary: ResultSummary::default(),
    }
}

async fn get(state: AppState, uri: &str) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

#[tokio::test]
async fn health_reports_ok() {
    let (state, _) = state();
    let (status, _, body) = get(state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn next_video_empty_then_selected() {
    let (state, registry) = state();
    let (status, _, body) = get(state.clone(), "/api/next-video/cam-1").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["video"]["available"], false);
    assert_eq!(json["queueDepth"], 0);

    let source = registry.get("cam-1").unwrap();
    for n in [5, 6, 7] {
        source.insert_processed(processed(n));
    }
    let (_, _, body) = get(state, "/api/next-video/cam-1").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["video"]["available"], true);
    assert_eq!(json["video"]["clipNumber"], 6);
    assert_eq!(json["video"]["duration"], 10.5);
    assert!(json["video"]["timestamp"].is_string());
}

#[tokio::test]
async fn unknown_source_is_404() {
    let (state, _) = state();
    let (status, _, body) = get(state.clone(), "/api/next-video/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("ghost"));

    let (status, _, _) = get(state, "/api/stats/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn video_returns_payload_with_headers() {
    let (state, registry) = state();
    registry.get("cam-1").unwrap().insert_processed(processed(3));

    let (status, headers, body) = get(state.clone(), "/api/video/cam-1/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"clip-3");
    assert_eq!(headers["content-type"], "video/mp4");
    assert_eq!(headers["x-clip-number"], "3");
    assert_eq!(headers["x-clip-duration"], "10.5");

    let (status, _, _) = get(state, "/api/video/cam-1/4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_reports_counters() {
    let (state, registry) = state();
    registry.get("cam-1").unwrap().insert_processed(processed(1));

    let (status, _, body) = get(state, "/api/stats/cam-1").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["bufferOccupancy"], 1);
    assert_eq!(json["bufferCapacity"], 10);
    assert_eq!(json["workerCount"], 3);
    assert_eq!(json["clipsFailed"], 0);
    assert_eq!(json["sourceConnected"], false);
}

#[tokio::test]
async fn http_client_reads_from_running_server() {
    let (state, registry) = state();
    let shutdown = state.shutdown.clone();
    registry.get("cam-1").unwrap().insert_processed(processed(8));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, router(state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });

    let client = HttpClipSource::new(format!("http://{}", addr)).unwrap();
    let next = client.next_video("cam-1").await.unwrap();
    assert_eq!(next.video.clip_number, Some(8));

    let clip = client.fetch_clip("cam-1", 8).await.unwrap().unwrap();
    assert_eq!(&clip.payload[..], b"clip-8");
    assert_eq!(clip.duration, 10.5);
    assert!(client.fetch_clip("cam-1", 9).await.unwrap().is_none());
    assert!(client.next_video("ghost").await.is_err());

    server.abort();
}
