use crate::domain::poller::{LocalClip, NextVideo};
use crate::error::Result;
use async_trait::async_trait;

/// Read side of the delivery interface as seen by a viewer.
#[async_trait]
pub trait ClipSource: Send + Sync {
    async fn next_video(&self, token: &str) -> Result<NextVideo>;

    /// `Ok(None)` when the clip was evicted or never existed.
    async fn fetch_clip(&self, token: &str, clip_number: u64) -> Result<Option<LocalClip>>;
}
