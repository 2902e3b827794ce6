//! ActivationCoordinator — the per-wave parallel fan-out.
//!
//! ```text
//! verdict.activated_agents
//!   → drop ids not in the registry (logged + WaveEvent)
//!   → JoinSet::spawn(respond(agent_i)) × N, Semaphore-bounded
//!   → join: each task's result lands under its agent id
//!   → a failed or panicked task becomes a zero-energy `error` response
//! ```
//!
//! One agent's failure never affects another's result. Completion order is
//! unspecified; the returned map is keyed by agent id so the result is
//! deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use ripple_core::{AgentActivation, ParticipantResponse, RetryPolicy, Ripple, WaveEvent};

use crate::caller::AgentCaller;
use crate::error::CallerError;
use crate::participant::{respond, ParticipantCall, ParticipantRegistry};

/// Joined result of one wave's fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanOut {
    pub responses: BTreeMap<String, ParticipantResponse>,
    pub events: Vec<WaveEvent>,
}

pub struct ActivationCoordinator {
    caller: Arc<dyn AgentCaller>,
    profile: Arc<str>,
    policy: RetryPolicy,
    max_parallel: usize,
}

impl ActivationCoordinator {
    pub fn new(caller: Arc<dyn AgentCaller>, max_retries: u32, max_parallel: usize) -> Self {
        Self {
            caller,
            profile: Arc::from(""),
            policy: RetryPolicy::new(max_retries),
            max_parallel: max_parallel.max(1),
        }
    }

    /// Skill profile prepended to every participant's system prompt.
    pub fn with_profile(mut self, profile: impl Into<Arc<str>>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Activate every known agent in `activations` concurrently.
    pub async fn activate(
        &self,
        registry: &ParticipantRegistry,
        activations: &[AgentActivation],
        ripple: &Ripple,
    ) -> FanOut {
        let mut fan_out = FanOut::default();
        let sem = Arc::new(Semaphore::new(self.max_parallel));
        let mut join_set: JoinSet<(String, Result<ParticipantResponse, CallerError>)> = JoinSet::new();
        let mut pending: BTreeSet<String> = BTreeSet::new();

        for activation in activations {
            let id = activation.agent_id.as_str();
            let Some(participant) = registry.get(id) else {
                warn!(agent_id = %id, registered = ?registry.ids(), "Verdict named an unknown agent; dropping");
                fan_out.events.push(WaveEvent::UnknownAgentDropped {
                    agent_id: id.to_string(),
                });
                continue;
            };
            if !pending.insert(id.to_string()) {
                debug!(agent_id = %id, "Agent activated twice in one wave; keeping first");
                continue;
            }

            info!(
                agent_id = %id,
                kind = %participant.kind(),
                energy = activation.incoming_ripple_energy,
                "Activating participant"
            );
            let call = ParticipantCall::new(
                participant,
                &self.profile,
                ripple,
                activation.incoming_ripple_energy,
                self.policy,
            );
            let caller = self.caller.clone();
            let sem = sem.clone();

            join_set.spawn(async move {
                let agent_id = call.agent_id.clone();
                let result = match sem.acquire_owned().await {
                    Ok(_permit) => respond(caller, call).await,
                    Err(_) => Err(CallerError::Refused("fan-out semaphore closed".to_string())),
                };
                (agent_id, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((agent_id, result)) => {
                    pending.remove(&agent_id);
                    let response = match result {
                        Ok(response) => response,
                        Err(e) => {
                            error!(agent_id = %agent_id, error = %e, "Participant failed");
                            fan_out.events.push(WaveEvent::ParticipantFailed {
                                agent_id: agent_id.clone(),
                                error: e.to_string(),
                            });
                            ParticipantResponse::error(e.to_string())
                        }
                    };
                    fan_out.responses.insert(agent_id, response);
                }
                Err(e) => {
                    // The panicked task's id is recovered from `pending` below.
                    warn!(error = %e, "Participant task panicked");
                }
            }
        }

        for agent_id in pending {
            fan_out.events.push(WaveEvent::ParticipantFailed {
                agent_id: agent_id.clone(),
                error: "participant task panicked".to_string(),
            });
            fan_out
                .responses
                .insert(agent_id, ParticipantResponse::error("participant task panicked"));
        }

        fan_out
    }
}
