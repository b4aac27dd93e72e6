//! Viewer-side client for the delivery routes.

use crate::domain::poller::{LocalClip, NextVideo};
use crate::error::{Error, Result};
use crate::ports::delivery::ClipSource;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpClipSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClipSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ClipSource for HttpClipSource {
    async fn next_video(&self, token: &str) -> Result<NextVideo> {
        let url = format!("{}/api/next-video/{}", self.base_url, token);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("source {}", token)));
        }
        Ok(response.error_for_status()?.json().await?)
    }

    async fn fetch_clip(&self, token: &str, clip_number: u64) -> Result<Option<LocalClip>> {
        let url = format!("{}/api/video/{}/{}", self.base_url, token, clip_number);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;

        let duration = response
            .headers()
            .get("x-clip-duration")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or_default();
        let payload = response.bytes().await?;

        Ok(Some(LocalClip {
            clip_number,
            duration,
            payload,
        }))
    }
}
