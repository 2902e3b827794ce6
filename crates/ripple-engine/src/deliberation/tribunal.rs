//! Tribunal members: one evaluator seat backed by an LLM caller.
//!
//! Every call is retried independently under the evaluator policy and none
//! of them can fail a deliberation:
//!
//! | call      | safe default                                   |
//! |-----------|------------------------------------------------|
//! | evaluate  | score 3 on every dimension, error narrative    |
//! | challenge | the raw reply text, verbatim                   |
//! | revise    | the prior opinion unchanged, error narrative   |

use std::sync::Arc;

use tracing::{error, warn};

use ripple_core::{
    coerce, extract_json_object, Challenge, Outcome, ParseResult, RetryPolicy, TribunalMember,
    TribunalOpinion,
};

use crate::caller::{call_with_retry, AgentCaller, CallRequest, Exhausted};
use crate::prompts;

pub struct TribunalAgent {
    member: TribunalMember,
    caller: Arc<dyn AgentCaller>,
    system_prompt: String,
    policy: RetryPolicy,
}

impl TribunalAgent {
    pub fn new(member: TribunalMember, caller: Arc<dyn AgentCaller>, max_retries: u32) -> Self {
        Self {
            member,
            caller,
            system_prompt: String::new(),
            policy: RetryPolicy::new(max_retries),
        }
    }

    /// System prompt shared by every call of this seat.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn role(&self) -> &str {
        &self.member.role
    }

    pub fn member(&self) -> &TribunalMember {
        &self.member
    }

    async fn call<T, F>(&self, label: &str, user_prompt: &str, decode: F) -> Result<T, Exhausted>
    where
        F: Fn(&str) -> ParseResult<T>,
    {
        let request = CallRequest {
            label,
            system_prompt: &self.system_prompt,
            user_prompt,
        };
        match call_with_retry(self.caller.as_ref(), request, self.policy, None, decode).await {
            Ok(decoded) => decoded,
            // Unreachable without a budget guard; treat like exhaustion.
            Err(e) => Err(Exhausted {
                attempts: 0,
                last_error: crate::error::CallerError::Refused(e.to_string()).into(),
                last_raw: None,
            }),
        }
    }

    /// Round-0 independent evaluation.
    pub async fn evaluate(&self, evidence: &str, rubric: &str, dimensions: &[String]) -> Outcome<TribunalOpinion> {
        let m = &self.member;
        let prompt = prompts::tribunal_evaluate(&m.role, &m.expertise, &m.perspective, evidence, rubric, dimensions);
        let label = format!("TRIBUNAL:{}:evaluate", m.role);
        match self
            .call(&label, &prompt, |raw| TribunalOpinion::parse(&m.role, raw, 0))
            .await
        {
            Ok(opinion) => Outcome::ok(opinion),
            Err(exhausted) => {
                let reason = exhausted.last_error.to_string();
                error!(role = %m.role, error = %reason, "Tribunal evaluation failed; using neutral scores");
                Outcome::degraded(TribunalOpinion::neutral(&m.role, dimensions, 0, &reason), reason)
            }
        }
    }

    /// Challenge `target`'s opinion.
    pub async fn challenge(&self, target: &TribunalOpinion) -> Outcome<Challenge> {
        let m = &self.member;
        let scores_json = serde_json::to_string(&target.scores).unwrap_or_default();
        let prompt = prompts::tribunal_challenge(&m.role, &m.perspective, &target.member_role, &scores_json, &target.narrative);
        let label = format!("TRIBUNAL:{}:challenge", m.role);
        let decoded = self
            .call(&label, &prompt, |raw| {
                let obj = extract_json_object(raw)?;
                ripple_core::require_fields(&obj, &["challenge"])?;
                Ok(coerce::as_text(obj.get("challenge")))
            })
            .await;

        let challenge = |text: String| Challenge {
            challenger: m.role.clone(),
            target: target.member_role.clone(),
            challenge: text,
        };
        match decoded {
            Ok(text) => Outcome::ok(challenge(text)),
            Err(exhausted) => {
                let reason = exhausted.last_error.to_string();
                warn!(role = %m.role, target = %target.member_role, error = %reason, "Challenge unparsed; using raw reply");
                Outcome::degraded(challenge(exhausted.last_raw.unwrap_or_default()), reason)
            }
        }
    }

    /// Revise `prior` in light of `challenges`.
    pub async fn revise(&self, prior: &TribunalOpinion, challenges: &[String], round: u32) -> Outcome<TribunalOpinion> {
        let m = &self.member;
        let scores_json = serde_json::to_string(&prior.scores).unwrap_or_default();
        let prompt = prompts::tribunal_revise(
            &m.role,
            &m.perspective,
            prior.round_number,
            &scores_json,
            &prior.narrative,
            challenges,
        );
        let label = format!("TRIBUNAL:{}:revise:{}", m.role, round);
        match self
            .call(&label, &prompt, |raw| TribunalOpinion::parse(&m.role, raw, round))
            .await
        {
            Ok(opinion) => Outcome::ok(opinion),
            Err(exhausted) => {
                let reason = exhausted.last_error.to_string();
                error!(role = %m.role, round, error = %reason, "Revision failed; keeping prior opinion");
                Outcome::degraded(TribunalOpinion::kept(prior, round, &reason), reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::CallerError;

    struct Queue(Mutex<Vec<String>>);

    #[async_trait]
    impl AgentCaller for Queue {
        async fn call(&self, _system: &str, _user: &str) -> Result<String, CallerError> {
            let mut q = self.0.lock().unwrap();
            if q.is_empty() {
                return Err(CallerError::transport("queue empty"));
            }
            Ok(q.remove(0))
        }
    }

    fn agent(replies: &[&str], retries: u32) -> TribunalAgent {
        let caller = Arc::new(Queue(Mutex::new(replies.iter().map(|s| s.to_string()).collect())));
        TribunalAgent::new(
            TribunalMember::new("MarketAnalyst", "demand side", "consumer research"),
            caller,
            retries,
        )
    }

    fn dims() -> Vec<String> {
        vec!["demand".into(), "moat".into()]
    }

    #[tokio::test]
    async fn evaluate_retries_then_parses() {
        let a = agent(&["not json", r#"{"scores": {"demand": 4, "moat": 9}, "narrative": "ok"}"#], 1);
        let out = a.evaluate("evidence", "rubric", &dims()).await;
        assert!(!out.is_degraded());
        assert_eq!(out.value().scores["demand"], 4);
        assert_eq!(out.value().scores["moat"], 5);
        assert_eq!(out.value().round_number, 0);
    }

    #[tokio::test]
    async fn evaluate_degrades_to_neutral() {
        let a = agent(&["nope", "still nope"], 1);
        let out = a.evaluate("evidence", "rubric", &dims()).await;
        assert!(out.is_degraded());
        assert!(out.value().scores.values().all(|s| *s == 3));
        assert!(out.value().narrative.starts_with("Evaluation failed"));
    }

    #[tokio::test]
    async fn challenge_falls_back_to_raw_text() {
        let a = agent(&["You ignore churn entirely."], 0);
        let target = TribunalOpinion {
            member_role: "DevilsAdvocate".into(),
            scores: BTreeMap::new(),
            narrative: "great".into(),
            round_number: 0,
        };
        let out = a.challenge(&target).await;
        assert!(out.is_degraded());
        assert_eq!(out.value().challenge, "You ignore churn entirely.");
        assert_eq!(out.value().target, "DevilsAdvocate");
        assert_eq!(out.value().challenger, "MarketAnalyst");
    }

    #[tokio::test]
    async fn revise_keeps_prior_on_failure() {
        let a = agent(&[], 0);
        let mut scores = BTreeMap::new();
        scores.insert("demand".to_string(), 2u8);
        let prior = TribunalOpinion {
            member_role: "MarketAnalyst".into(),
            scores,
            narrative: "weak".into(),
            round_number: 1,
        };
        let out = a.revise(&prior, &["too harsh".to_string()], 2).await;
        assert!(out.is_degraded());
        assert_eq!(out.value().scores, prior.scores);
        assert_eq!(out.value().round_number, 2);
        assert!(out.value().narrative.contains("Keeping original"));
    }
}
