//! Harvest orchestration

mod context;
mod error;
mod orchestrator;
mod outcome;

pub use context::HarvestContext;
pub use error::HarvestError;
pub use orchestrator::HarvestOrchestrator;
pub use outcome::{HarvestReport, ItemOutcome, Tally};
