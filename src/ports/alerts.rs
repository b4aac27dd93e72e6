use crate::domain::alerts::AlertEvent;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert dispatch failed: {0}")]
    Dispatch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where the pipeline hands alerts off. Never waits on whoever consumes them.
#[cfg_attr(test, mockall::automock)]
pub trait AlertPublisher: Send + Sync {
    /// Returns how many consumers received the event.
    fn publish(&self, event: AlertEvent) -> usize;
}

/// External alert dispatch. Delivery is fire-and-forget from the pipeline's view.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn dispatch(&self, event: &AlertEvent) -> Result<(), AlertError>;
}
