use crate::domain::alerts::AlertEvent;
use crate::ports::alerts::{AlertError, AlertSink};
use async_trait::async_trait;

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn dispatch(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let labels: Vec<&str> = event
            .result_summary
            .detections
            .iter()
            .map(|d| d.label.as_str())
            .collect();
        tracing::warn!(
            source = %event.source_token,
            clip = event.clip_number,
            confidence = event.result_summary.highest_confidence,
            ?labels,
            "Alert raised"
        );
        Ok(())
    }
}

/// POSTs each alert as JSON to an external dispatcher.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn dispatch(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let response = self.client.post(&self.url).json(event).send().await?;
        if !response.status().is_success() {
            return Err(AlertError::Dispatch(format!(
                "webhook answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}
