//! Outcome — real vs. degraded results.
//!
//! Phases that must never abort a run (verdicts, OBSERVE, SYNTHESIZE,
//! extra phases, tribunal calls) return an `Outcome<T>` instead of an error.
//! A degraded outcome still carries a usable payload (the phase's safe
//! default) plus the reason the real value could not be produced.
//!
//! ```text
//! LLM call
//!   ├─ parsed on attempt k ≤ 1+max_retries → Outcome::Ok(value)
//!   └─ every attempt failed               → Outcome::Degraded { value: default, reason }
//! ```

use serde::{Deserialize, Serialize};

/// A payload tagged with whether it is the real result or a safe default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The collaborator produced a valid result.
    Ok { value: T },
    /// Retries were exhausted; `value` is the documented safe default.
    Degraded { value: T, reason: String },
}

impl<T> Outcome<T> {
    /// Wrap a real result.
    pub fn ok(value: T) -> Self {
        Self::Ok { value }
    }

    /// Wrap a safe default with the reason it was needed.
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    /// Whether this outcome is a fallback.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Borrow the payload regardless of status.
    pub fn value(&self) -> &T {
        match self {
            Self::Ok { value } | Self::Degraded { value, .. } => value,
        }
    }

    /// Take the payload regardless of status.
    pub fn into_value(self) -> T {
        match self {
            Self::Ok { value } | Self::Degraded { value, .. } => value,
        }
    }

    /// Degradation reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Ok { .. } => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }

    /// Transform the payload, preserving status.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Ok { value } => Outcome::Ok { value: f(value) },
            Self::Degraded { value, reason } => Outcome::Degraded {
                value: f(value),
                reason,
            },
        }
    }
}

impl std::fmt::Display for Outcome<()> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok { .. } => write!(f, "ok"),
            Self::Degraded { reason, .. } => write!(f, "degraded: {}", reason),
        }
    }
}
