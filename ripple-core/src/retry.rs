//! Retry-with-error-prefix prompting.
//!
//! When a model reply fails to decode, the next attempt resends the original
//! user prompt with the failure prepended. The prefix is built from the
//! original prompt every time, so repeated failures do not stack.

/// Attempt policy shared by every retried LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Total attempts, the first one included.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_last(&self, attempt: u32) -> bool {
        attempt + 1 >= self.attempts()
    }
}

/// User prompt for zero-based `attempt`.
///
/// Attempt 0, or any attempt without a recorded error, gets the original
/// prompt unchanged.
pub fn next_prompt(attempt: u32, last_error: Option<&str>, original: &str) -> String {
    match last_error {
        Some(err) if attempt > 0 => format!(
            "Your previous reply could not be used: {}\n\
             Reply again with exactly one valid JSON object and nothing else.\n\n{}",
            err, original
        ),
        _ => original.to_string(),
    }
}
