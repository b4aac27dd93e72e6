//! Cliprelay - Clip ingest, analysis and delivery pipeline
//!
//! Hexagonal Architecture:
//! - domain/: Pure pipeline logic (reassembly, output buffer, poller)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Services wiring ports together
//! - config: Environment configuration
//!
//! Producers push clips over a WebSocket, a fixed pool of workers runs them
//! through the analysis collaborator, and viewers poll a per-source buffer of
//! recent results.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use config::{PipelineConfig, ViewerConfig};
pub use error::{Error, Result};
