use crate::domain::jobs::ResultSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raised when a processed clip's result crosses the alerting threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub source_token: String,
    pub clip_number: u64,
    pub result_summary: ResultSummary,
    pub raised_at: DateTime<Utc>,
}
