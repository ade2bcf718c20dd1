mod cycle;
mod orchestrator;

pub use cycle::{CheckFailure, CheckOutcome, CheckState, SkipReason};
pub use orchestrator::{CheckOrchestrator, TickReport};
