//! Ripple Engine Library
//!
//! Async orchestration for ripple propagation simulations. A run takes a
//! free-form simulation input through a fixed phase plan, driving one
//! decision agent and a population of participant agents through an LLM
//! caller seam, and produces a structured prediction.
//!
//! # Phases
//!
//! ```text
//! INIT → SEED → RIPPLE → OBSERVE → SYNTHESIZE
//!                 │
//!                 └─ extras (e.g. DELIBERATE) run right after their anchor
//! ```
//!
//! # Modules
//!
//! - `phase`: phase plan, `PhaseOrchestrator`, extra-phase registration
//! - `wave`: the budgeted wave loop with the wave-0 group guard
//! - `activation`: bounded, failure-isolated participant fan-out
//! - `decision`: the decision agent (INIT, verdicts, OBSERVE, SYNTHESIZE)
//! - `participant`: participant memory and the per-call prompt builder
//! - `deliberation`: tribunal members, the round protocol, DELIBERATE
//! - `ensemble`: sequential multi-run aggregation and variant comparison
//! - `caller`: the `AgentCaller` seam and the shared retry loop
//! - `budget`: call budget shared across a run or an ensemble
//! - `events`: progress events and sinks
//! - `persistence`: optional persistence hooks
//! - `config`: engine configuration (TOML file plus env overrides)
//! - `context`: per-run context
//! - `error`: run error taxonomy
//! - `input`: the simulation input wrapper
//! - `prompts`: prompt text for every role

#![allow(clippy::uninlined_format_args)]

pub mod activation;
pub mod budget;
pub mod caller;
pub mod config;
pub mod context;
pub mod decision;
pub mod deliberation;
pub mod ensemble;
pub mod error;
pub mod events;
pub mod input;
pub mod participant;
pub mod persistence;
pub mod phase;
pub mod prompts;
pub mod wave;

pub use activation::{ActivationCoordinator, FanOut};
pub use budget::{BudgetGuard, CallBudget, Unlimited};
pub use caller::{call_with_retry, AgentCaller, CallRequest, Exhausted};
pub use config::EngineConfig;
pub use context::{new_run_id, RunContext};
pub use decision::{DecisionAgent, InitResult};
pub use deliberation::{DeliberationOrchestrator, DeliberationPhase, DeliberationSummary, TribunalAgent};
pub use ensemble::{
    extract_grade, extract_scores, EnsembleAggregator, EnsembleReport, EnsembleRun, EnsembleStats,
    RunStatus, VariantComparison,
};
pub use error::{CallerError, PhaseError, PhasePlanError, RetryCategory, RunError, RunResult};
pub use events::{BroadcastSink, FnSink, ProgressEvent, ProgressEventKind, ProgressSink};
pub use input::SimulationInput;
pub use persistence::{NoopPersistence, PersistenceSink};
pub use phase::{
    BuiltinPhase, ExtraPhase, PhaseContext, PhaseHandler, PhaseOrchestrator, PhaseOrchestratorBuilder,
    PhasePlan, PhaseTiming, RunReport, SimulationRunner,
};
pub use wave::{RippleOutcome, StopReason, WaveEngine};
