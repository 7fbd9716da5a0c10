mod orchestrator;

pub use orchestrator::{BatchError, BatchOrchestrator, BatchOutcome, EMPTY_ISOCHRONE_ERROR};
