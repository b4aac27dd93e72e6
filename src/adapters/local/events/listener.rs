use super::hub::AlertHub;
use crate::ports::alerts::AlertSink;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Forwards every published alert to each sink. Sink failures are only logged.
pub fn start(
    hub: Arc<AlertHub>,
    sinks: Vec<Arc<dyn AlertSink>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = hub.subscribe();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Alert listener lagged, events skipped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            for sink in &sinks {
                if let Err(e) = sink.dispatch(&event).await {
                    tracing::warn!(
                        source = %event.source_token,
                        clip = event.clip_number,
                        error = %e,
                        "Alert dispatch failed"
                    );
                }
            }
        }
    })
}
