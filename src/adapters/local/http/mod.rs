//! HTTP inbound adapter.
//!
//! Producers stream clips over a WebSocket, viewers poll the delivery routes.

pub mod client;
pub mod routes;

pub use client::HttpClipSource;

use crate::application::delivery::DeliveryService;
use crate::application::registry::SourceRegistry;
use crate::domain::reassembly::ReassemblerLimits;
use crate::ports::queue::JobQueuePort;
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SourceRegistry>,
    pub queue: Arc<dyn JobQueuePort>,
    pub delivery: DeliveryService,
    pub limits: ReassemblerLimits,
    pub enqueue_timeout: Duration,
    pub content_type: String,
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/camera/:token", get(routes::camera::handle))
        .route("/api/next-video/:token", get(routes::delivery::next_video))
        .route(
            "/api/video/:token/:clip_number",
            get(routes::delivery::video),
        )
        .route("/api/stats/:token", get(routes::delivery::stats))
        .route("/health", get(routes::delivery::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
