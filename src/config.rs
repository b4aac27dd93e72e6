//! Configuration for the pipeline server and the viewer client.

use crate::domain::poller::PollerConfig;
use crate::domain::reassembly::ReassemblerLimits;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the ingest/processing/delivery server.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Number of concurrent analysis workers
    pub worker_count: usize,
    /// Bound of the shared intake queue
    pub intake_capacity: usize,
    /// How long a finished upload may wait for room in the intake queue
    pub enqueue_timeout: Duration,
    /// Processed clips kept per source
    pub buffer_capacity: usize,
    pub assembly_timeout: Duration,
    pub max_open_assemblies: usize,
    pub max_clip_bytes: u64,
    /// Accepted producer tokens. Empty accepts any token on first connect.
    pub source_tokens: Vec<String>,
    /// External analyzer program; passthrough when unset
    pub analyzer_cmd: Option<String>,
    pub analyzer_args: Vec<String>,
    pub analyzer_timeout: Duration,
    pub alert_threshold: f32,
    pub alert_cooldown: Duration,
    pub alert_webhook_url: Option<String>,
    pub clip_content_type: String,
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            worker_count: parse_var("WORKER_COUNT", 3usize).max(1),
            intake_capacity: parse_var("INTAKE_CAPACITY", 32usize).max(1),
            enqueue_timeout: Duration::from_millis(parse_var("ENQUEUE_TIMEOUT_MS", 2000)),
            buffer_capacity: parse_var("BUFFER_CAPACITY", 10usize).max(1),
            assembly_timeout: Duration::from_millis(parse_var("ASSEMBLY_TIMEOUT_MS", 30_000)),
            max_open_assemblies: parse_var("MAX_OPEN_ASSEMBLIES", 4usize).max(1),
            max_clip_bytes: parse_var("MAX_CLIP_BYTES", 64 * 1024 * 1024),
            source_tokens: list_var("SOURCE_TOKENS", ','),
            analyzer_cmd: optional_var("ANALYZER_CMD"),
            analyzer_args: list_var("ANALYZER_ARGS", ' '),
            analyzer_timeout: Duration::from_millis(parse_var("ANALYZER_TIMEOUT_MS", 60_000)),
            alert_threshold: parse_var("ALERT_THRESHOLD", 0.5f32),
            alert_cooldown: Duration::from_secs(parse_var("ALERT_COOLDOWN_SECS", 300)),
            alert_webhook_url: optional_var("ALERT_WEBHOOK_URL"),
            clip_content_type: env::var("CLIP_CONTENT_TYPE")
                .unwrap_or_else(|_| String::from("video/mp4")),
        }
    }

    pub fn reassembler_limits(&self) -> ReassemblerLimits {
        ReassemblerLimits {
            max_open: self.max_open_assemblies,
            max_clip_bytes: self.max_clip_bytes,
            timeout: self.assembly_timeout,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let limits = ReassemblerLimits::default();
        Self {
            addr: String::from("127.0.0.1"),
            port: String::from("3000"),
            worker_count: 3,
            intake_capacity: 32,
            enqueue_timeout: Duration::from_millis(2000),
            buffer_capacity: 10,
            assembly_timeout: limits.timeout,
            max_open_assemblies: limits.max_open,
            max_clip_bytes: limits.max_clip_bytes,
            source_tokens: Vec::new(),
            analyzer_cmd: None,
            analyzer_args: Vec::new(),
            analyzer_timeout: Duration::from_secs(60),
            alert_threshold: 0.5,
            alert_cooldown: Duration::from_secs(300),
            alert_webhook_url: None,
            clip_content_type: String::from("video/mp4"),
        }
    }
}

/// Configuration for the viewer binary.
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub server: String,
    pub token: String,
    /// Where played clips are written, if anywhere
    pub out_dir: Option<String>,
    pub poller: PollerConfig,
}

impl ViewerConfig {
    /// Load configuration from environment variables.
    /// Returns `None` if `VIEWER_TOKEN` is not set.
    pub fn from_env() -> Option<Self> {
        dotenv::dotenv().ok();

        Some(Self {
            server: env::var("VIEWER_SERVER")
                .unwrap_or_else(|_| String::from("http://127.0.0.1:3000")),
            token: optional_var("VIEWER_TOKEN")?,
            out_dir: optional_var("VIEWER_OUT_DIR"),
            poller: PollerConfig::default(),
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn list_var(key: &str, separator: char) -> Vec<String> {
    optional_var(key)
        .map(|raw| split_list(&raw, separator))
        .unwrap_or_default()
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
