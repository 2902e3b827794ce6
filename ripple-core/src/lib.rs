//! Ripple Core Library
//!
//! Deterministic building blocks for simulating how a piece of content
//! propagates through a population of LLM-backed actors, and for grading
//! the result with a multi-evaluator tribunal.
//!
//! Nothing in this crate performs I/O or awaits. The async orchestration
//! (phases, waves, fan-out, deliberation rounds, ensemble runs) lives in
//! `ripple-engine` and is built on top of these types.
//!
//! # Modules
//!
//! - `model`: ripples, verdicts, wave records, field snapshots, tribunal
//!   types, evidence packs
//! - `outcome`: `Outcome<T>`, the tagged real-vs-degraded result
//! - `json`: first-object extraction from raw LLM text
//! - `coerce`: tolerant numeric/string coercion with an explicit key table
//! - `budget`: horizon/window parsing and wave budgeting
//! - `history`: bounded-size propagation history for prompting
//! - `retry`: retry-with-error-prefix prompt construction
//! - `consensus`: tribunal opponent selection and convergence gates
//! - `stats`: median/IQR, stability labels, Fleiss' kappa
//! - `variant`: seed derivation and presentation-order shuffling

#![allow(clippy::uninlined_format_args)]

pub mod budget;
pub mod coerce;
pub mod consensus;
pub mod error;
pub mod history;
pub mod json;
pub mod model;
pub mod outcome;
pub mod retry;
pub mod stats;
pub mod variant;

pub use budget::{parse_hours, TimeProgress, WaveBudget, WaveBudgetSource};
pub use consensus::{
    is_stable_transition, max_gap_opponent, partition_agreement, ConvergenceTracker,
    CONSECUTIVE_STABLE_REQUIRED,
};
pub use error::{ParseError, ParseResult};
pub use history::{HistoryWindow, DEFAULT_HISTORY_WINDOW};
pub use json::{extract_json_object, require_fields};
pub use model::{
    AgentActivation, AgentDescriptor, AgentKind, AgentSkip, AgentSnapshot, AgentStats, Challenge,
    DeliberationRecord, EvidencePack, FieldSnapshot, KeySignal, OmniscientVerdict,
    ParticipantResponse, PropagationStatistics, ResponseType, Ripple, SnapshotParameters,
    TribunalMember, TribunalOpinion, WaveEvent, WaveRecord,
};
pub use outcome::Outcome;
pub use retry::{next_prompt, RetryPolicy};
pub use stats::{
    aggregate_ordinal_scores, dimension_kappa, fleiss_kappa, grade_agreement, kappa_label,
    median_iqr, stability_label, DimensionAggregate,
};
pub use variant::{compute_variant_seeds, shuffle_variant_order, VariantPlan};
