//! Run error taxonomy with retry classification.
//!
//! Only two kinds of failure escape a run: INIT configuration failure and
//! invalid construction. Budget exhaustion is a hard stop raised by the
//! budget guard. Everything else degrades inside the run and is reported
//! through [`ripple_core::Outcome`].
//!
//! | Category          | Retriable | Escapes a run |
//! |-------------------|-----------|---------------|
//! | Transient         | yes       | no            |
//! | ParseFailure      | yes       | no            |
//! | Configuration     | no        | yes           |
//! | BudgetExhausted   | no        | yes           |
//! | InvalidConstruction | no      | yes           |

use std::fmt;

use thiserror::Error;

use ripple_core::ParseError;

/// Classification used to decide whether a failed call may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Transport or backend failure of a collaborator call.
    Transient,
    /// The model answered but the output did not decode.
    ParseFailure,
    /// INIT could not produce a usable configuration.
    Configuration,
    /// The shared call budget refused further calls.
    BudgetExhausted,
    /// The engine was wired incorrectly.
    InvalidConstruction,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::ParseFailure)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::Configuration => write!(f, "configuration"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::InvalidConstruction => write!(f, "invalid_construction"),
        }
    }
}

/// Error returned by an LLM collaborator call.
#[derive(Debug, Clone, Error)]
pub enum CallerError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Call refused: {0}")]
    Refused(String),
}

impl CallerError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// A single failed attempt inside a retry loop.
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Caller(#[from] CallerError),
}

impl AttemptError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Parse(_) => RetryCategory::ParseFailure,
            Self::Caller(_) => RetryCategory::Transient,
        }
    }
}

/// Invalid extra-phase registration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhasePlanError {
    #[error("Phase '{0}' is already registered")]
    DuplicateName(String),

    #[error("Phase '{name}' anchors on unknown phase '{anchor}'")]
    UnknownAnchor { name: String, anchor: String },

    #[error("Phase '{name}' has invalid weight {weight}")]
    InvalidWeight { name: String, weight: f64 },

    #[error("Phases form a cycle and can never run: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Error from a phase handler. Handlers never abort a run: the failure is
/// logged and the phase output becomes degraded.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Caller(#[from] CallerError),

    #[error("Phase failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// An INIT sub-call exhausted its retries.
    #[error("INIT {step} failed after {attempts} attempts: {last_error}")]
    Configuration {
        step: String,
        attempts: u32,
        last_error: String,
    },

    /// The budget guard refused a call.
    #[error("Call budget exhausted before {role} call (ceiling {ceiling})")]
    BudgetExhausted { role: String, ceiling: u64 },

    /// Required wiring is missing or the phase plan is invalid.
    #[error("Invalid construction: {0}")]
    InvalidConstruction(String),

    #[error(transparent)]
    PhasePlan(#[from] PhasePlanError),
}

impl RunError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Configuration { .. } => RetryCategory::Configuration,
            Self::BudgetExhausted { .. } => RetryCategory::BudgetExhausted,
            Self::InvalidConstruction(_) | Self::PhasePlan(_) => RetryCategory::InvalidConstruction,
        }
    }

    /// Every run error is fatal to the run that raised it. Budget exhaustion
    /// is additionally fatal to an ensemble.
    pub fn is_fatal(&self) -> bool {
        !self.retry_category().is_retriable()
    }

    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, Self::BudgetExhausted { .. })
    }
}

/// Result alias for run-level operations.
pub type RunResult<T> = Result<T, RunError>;
