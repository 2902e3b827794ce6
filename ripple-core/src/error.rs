//! Parse errors raised while decoding LLM output.
//!
//! Every variant is transient: callers retry with the error prepended to the
//! prompt and fall back to a phase-specific safe default once retries run out.

use thiserror::Error;

/// Failure to turn raw LLM text into a usable structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Empty input")]
    Empty,

    #[error("No valid JSON object found in LLM output: {preview}")]
    NoJsonObject { preview: String },

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ParseError {
    /// Convenience constructor for `InvalidValue`.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type for parse operations
pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_display() {
        let err = ParseError::MissingFields(vec!["topology".into(), "seed_ripple".into()]);
        assert_eq!(err.to_string(), "Missing required fields: topology, seed_ripple");
    }

    #[test]
    fn test_invalid_value_display() {
        let err = ParseError::invalid("agent_id", "expected string");
        assert_eq!(err.to_string(), "Invalid value for 'agent_id': expected string");
    }
}
