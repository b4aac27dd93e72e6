//! Analysis collaborator adapters.

mod command;
mod passthrough;

pub use command::CommandAnalyzer;
pub use passthrough::PassthroughAnalyzer;
