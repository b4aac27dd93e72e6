use crate::domain::jobs::{ClipMetadata, ResultSummary};
use crate::ports::analyzer::{Analysis, AnalysisError, Analyzer};
use async_trait::async_trait;
use bytes::Bytes;

/// Hands clips through untouched. Used when no analyzer program is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAnalyzer;

#[async_trait]
impl Analyzer for PassthroughAnalyzer {
    async fn analyze(
        &self,
        payload: Bytes,
        _metadata: &ClipMetadata,
    ) -> Result<Analysis, AnalysisError> {
        Ok(Analysis {
            payload,
            summary: ResultSummary::default(),
            annotated: false,
        })
    }
}
