//! Ports - Trait definitions for the pipeline's collaborators.

pub mod alerts;
pub mod analyzer;
pub mod delivery;
pub mod queue;
