//! Alert fan-out: hub, listener task and sinks.

pub mod hub;
pub mod listener;
pub mod sinks;

pub use hub::AlertHub;
pub use sinks::{LogAlertSink, WebhookAlertSink};
