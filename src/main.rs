//! Server binary - ingest, worker pool and delivery in one process.
//!
//! It wires up:
//! - Source registry and in-memory intake queue
//! - Analysis worker pool
//! - Alert hub and its sinks
//! - HTTP layer (producer WebSocket, viewer delivery API)

use cliprelay::adapters::local::analyzer::{CommandAnalyzer, PassthroughAnalyzer};
use cliprelay::adapters::local::events::{self, AlertHub, LogAlertSink, WebhookAlertSink};
use cliprelay::adapters::local::{router, AppState, MemoryQueue};
use cliprelay::application::alerts::AlertGate;
use cliprelay::application::delivery::DeliveryService;
use cliprelay::application::registry::SourceRegistry;
use cliprelay::application::worker::{WorkerPool, WorkerService};
use cliprelay::config::PipelineConfig;
use cliprelay::ports::alerts::AlertSink;
use cliprelay::ports::analyzer::Analyzer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Loaded after the subscriber so invalid values are reported.
    let config = PipelineConfig::from_env();

    let shutdown = CancellationToken::new();

    // 1. Adapters
    let registry = Arc::new(SourceRegistry::new(
        &config.source_tokens,
        config.buffer_capacity,
    ));
    let queue = MemoryQueue::new(config.intake_capacity, shutdown.clone());

    let analyzer: Arc<dyn Analyzer> = match &config.analyzer_cmd {
        Some(cmd) => {
            tracing::info!(command = %cmd, "Using external analyzer");
            Arc::new(CommandAnalyzer::new(
                cmd.clone(),
                config.analyzer_args.clone(),
                config.analyzer_timeout,
            ))
        }
        None => {
            tracing::warn!("ANALYZER_CMD not set, clips are delivered unannotated");
            Arc::new(PassthroughAnalyzer)
        }
    };

    // 2. Alerts
    let alert_hub = Arc::new(AlertHub::new());
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogAlertSink)];
    if let Some(url) = &config.alert_webhook_url {
        sinks.push(Arc::new(WebhookAlertSink::new(url.clone())));
    }
    let alert_listener = events::listener::start(alert_hub.clone(), sinks, shutdown.clone());
    let alert_gate = Arc::new(AlertGate::new(
        alert_hub,
        config.alert_threshold,
        config.alert_cooldown,
    ));

    // 3. Workers
    let worker_service = Arc::new(WorkerService::new(
        analyzer,
        queue.clone(),
        registry.clone(),
        Some(alert_gate),
    ));
    let activity = worker_service.activity();
    let workers = WorkerPool::new(worker_service, config.worker_count).start();
    tracing::info!(count = workers.len(), "Started analysis workers");

    // 4. HTTP Layer
    let queue: Arc<MemoryQueue> = Arc::new(queue);
    let state = AppState {
        registry: registry.clone(),
        queue: queue.clone(),
        delivery: DeliveryService::new(registry, queue, activity, config.worker_count),
        limits: config.reassembler_limits(),
        enqueue_timeout: config.enqueue_timeout,
        content_type: config.clip_content_type.clone(),
        shutdown: shutdown.clone(),
    };
    let app = router(state);

    // 5. Start Server
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!("Listening at {}:{}", config.addr, config.port);

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        signal.cancel();
    });

    let graceful = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .await
        .expect("Server failed to start");

    for worker in workers {
        let _ = worker.await;
    }
    let _ = alert_listener.await;
    tracing::info!("Shutdown complete");
}
