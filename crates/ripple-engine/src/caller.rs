//! LLM collaborator seam and the shared retry loop.
//!
//! Every model-backed role (decision agent, participants, tribunal members)
//! talks to its backend through [`AgentCaller`]. Routing, backend adapters
//! and per-call timeouts live behind the trait.

use async_trait::async_trait;
use tracing::{debug, warn};

use ripple_core::{next_prompt, ParseResult, RetryPolicy};

use crate::budget::BudgetGuard;
use crate::error::{AttemptError, CallerError, RunError, RunResult};

/// One LLM backend call: system prompt plus user prompt in, raw text out.
#[async_trait]
pub trait AgentCaller: Send + Sync {
    async fn call(&self, system_prompt: &str, user_prompt: &str) -> Result<String, CallerError>;
}

/// Prompts for one retried call.
#[derive(Debug, Clone, Copy)]
pub struct CallRequest<'a> {
    /// Label used in logs and budget denials (e.g. `"INIT:agents"`).
    pub label: &'a str,
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
}

/// Retries exhausted without a usable reply.
#[derive(Debug, Clone)]
pub struct Exhausted {
    pub attempts: u32,
    pub last_error: AttemptError,
    /// Raw text of the last reply that arrived, if any did.
    pub last_raw: Option<String>,
}

/// Call `caller` until `decode` accepts a reply or the policy runs out.
///
/// Each retry resends the original user prompt prefixed with the previous
/// error. When `budget` is set it is checked before every attempt and a
/// denial ends the loop with [`RunError::BudgetExhausted`]. Otherwise the
/// outer result is always `Ok` and the inner result says whether a reply
/// decoded.
pub async fn call_with_retry<T, F>(
    caller: &dyn AgentCaller,
    request: CallRequest<'_>,
    policy: RetryPolicy,
    budget: Option<&dyn BudgetGuard>,
    decode: F,
) -> RunResult<Result<T, Exhausted>>
where
    F: Fn(&str) -> ParseResult<T>,
{
    let mut last_error: Option<AttemptError> = None;
    let mut last_raw: Option<String> = None;

    for attempt in 0..policy.attempts() {
        if let Some(guard) = budget {
            if !guard.check(request.label) {
                return Err(RunError::BudgetExhausted {
                    role: request.label.to_string(),
                    ceiling: guard.ceiling(),
                });
            }
        }

        let err_text = last_error.as_ref().map(ToString::to_string);
        let prompt = next_prompt(attempt, err_text.as_deref(), request.user_prompt);
        debug!(label = request.label, attempt, "Calling model");

        let outcome = match caller.call(request.system_prompt, &prompt).await {
            Ok(raw) => {
                let decoded = decode(&raw).map_err(AttemptError::from);
                last_raw = Some(raw);
                decoded
            }
            Err(e) => Err(AttemptError::from(e)),
        };

        match outcome {
            Ok(value) => return Ok(Ok(value)),
            Err(e) => {
                warn!(
                    label = request.label,
                    attempt = attempt + 1,
                    category = %e.retry_category(),
                    error = %e,
                    "Model call attempt failed"
                );
                last_error = Some(e);
            }
        }
    }

    Ok(Err(Exhausted {
        attempts: policy.attempts(),
        last_error: last_error.unwrap_or_else(|| CallerError::Refused("no attempts allowed".into()).into()),
        last_raw,
    }))
}
