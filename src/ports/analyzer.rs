use crate::domain::jobs::{ClipMetadata, ResultSummary};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analyzer failed: {0}")]
    Failed(String),

    #[error("analyzer timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid analyzer output: {0}")]
    InvalidOutput(String),

    #[error("analyzer panicked")]
    Panicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub payload: Bytes,
    pub summary: ResultSummary,
    /// False when `payload` is the untouched input
    pub annotated: bool,
}

/// The compute-heavy analysis step. Called concurrently from every worker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        payload: Bytes,
        metadata: &ClipMetadata,
    ) -> Result<Analysis, AnalysisError>;
}

#[async_trait]
impl<T: Analyzer + ?Sized> Analyzer for Arc<T> {
    async fn analyze(
        &self,
        payload: Bytes,
        metadata: &ClipMetadata,
    ) -> Result<Analysis, AnalysisError> {
        (**self).analyze(payload, metadata).await
    }
}
