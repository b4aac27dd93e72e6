//! Local adapters for single-process deployment.

pub mod analyzer;
pub mod events;
pub mod http;
pub mod queue;

pub use events::AlertHub;
pub use http::{router, AppState, HttpClipSource};
pub use queue::MemoryQueue;
