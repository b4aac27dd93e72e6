//! Domain layer - Pure pipeline logic, no I/O.

pub mod alerts;
pub mod jobs;
pub mod messages;
pub mod output_buffer;
pub mod poller;
pub mod reassembly;
