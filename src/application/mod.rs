//! Application layer - services that wire the ports together.

pub mod alerts;
pub mod delivery;
pub mod ingest;
pub mod registry;
pub mod viewer;
pub mod worker;
