//! Tribunal deliberation: evaluator seats, the round protocol, and the
//! DELIBERATE phase adapter.

pub mod orchestrator;
pub mod phase;
pub mod tribunal;

pub use orchestrator::{DeliberationOrchestrator, DeliberationSummary, FinalPosition};
pub use phase::{DeliberationPhase, DELIBERATE_ANCHOR, DELIBERATE_PHASE, DELIBERATE_WEIGHT};
pub use tribunal::TribunalAgent;
