use crate::domain::jobs::{ClipMetadata, ResultSummary};
use crate::ports::analyzer::{Analysis, AnalysisError, Analyzer};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command as TokioCommand;

/// Runs an external analyzer program once per clip.
///
/// Invoked as `<program> <args..> <input> <output>`. The program writes the
/// annotated clip to `<output>` and prints a JSON `ResultSummary` on stdout
/// (an empty stdout means no detections).
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    async fn analyze(
        &self,
        payload: Bytes,
        metadata: &ClipMetadata,
    ) -> Result<Analysis, AnalysisError> {
        let input = NamedTempFile::new()?;
        let output = NamedTempFile::new()?;
        tokio::fs::write(input.path(), &payload).await?;

        let mut command = TokioCommand::new(&self.program);
        command
            .args(&self.args)
            .arg(input.path())
            .arg(output.path())
            .env("CLIP_SOURCE", &metadata.source)
            .env("CLIP_NUMBER", metadata.clip_number.to_string())
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AnalysisError::Timeout(self.timeout))??;

        if !result.status.success() {
            return Err(AnalysisError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        let annotated = tokio::fs::read(output.path()).await?;
        if annotated.is_empty() {
            return Err(AnalysisError::InvalidOutput(
                "analyzer produced an empty clip".to_string(),
            ));
        }

        Ok(Analysis {
            payload: Bytes::from(annotated),
            summary: parse_summary(&result.stdout)?,
            annotated: true,
        })
    }
}

fn parse_summary(stdout: &[u8]) -> Result<ResultSummary, AnalysisError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Ok(ResultSummary::default());
    }

    let summary: ResultSummary = serde_json::from_str(text)
        .map_err(|e| AnalysisError::InvalidOutput(format!("summary: {}", e)))?;
    if summary.highest_confidence == 0.0 && !summary.detections.is_empty() {
        return Ok(ResultSummary::from_detections(summary.detections));
    }
    Ok(summary)
}
