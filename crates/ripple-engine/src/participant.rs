//! Participant agents: simulated stars (individuals) and seas (groups).
//!
//! A participant knows only its own description, the ripple it receives and
//! its private memory. Memory is owned by the run's registry and appended
//! after a wave's fan-out has joined, never from inside a concurrent task.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use ripple_core::{
    AgentDescriptor, AgentKind, ParticipantResponse, ResponseType, RetryPolicy, Ripple,
};

use crate::caller::{call_with_retry, AgentCaller, CallRequest};
use crate::error::{AttemptError, CallerError};
use crate::prompts;

/// Characters of ripple content kept per memory entry.
const MEMORY_PREVIEW_CHARS: usize = 50;

/// Source string participants see for engine-delivered ripples.
pub const VERDICT_SOURCE: &str = "omniscient_verdict";

/// One remembered reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub ripple_preview: String,
    pub ripple_energy: f64,
    pub ripple_source: String,
    pub response_type: ResponseType,
}

#[derive(Debug, Clone)]
pub struct Participant {
    descriptor: AgentDescriptor,
    memory: Vec<MemoryEntry>,
    memory_window: usize,
}

impl Participant {
    pub fn new(descriptor: AgentDescriptor, memory_window: usize) -> Self {
        Self {
            descriptor,
            memory: Vec::new(),
            memory_window,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn kind(&self) -> AgentKind {
        self.descriptor.kind
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn memory(&self) -> &[MemoryEntry] {
        &self.memory
    }

    /// System prompt: optional skill profile, then the role instructions
    /// with the most recent memory entries.
    pub fn system_prompt(&self, profile: &str) -> String {
        let start = self.memory.len().saturating_sub(self.memory_window);
        let recent = &self.memory[start..];
        let memory = if recent.is_empty() {
            String::new()
        } else {
            let lines: Vec<String> = recent
                .iter()
                .map(|m| {
                    format!(
                        "- from {}: \"{}\" (energy {:.2}) → you chose {}",
                        m.ripple_source, m.ripple_preview, m.ripple_energy, m.response_type
                    )
                })
                .collect();
            format!("{}{}", prompts::PARTICIPANT_MEMORY_HEADER, lines.join("\n"))
        };
        let role = prompts::participant_system(self.kind(), &self.descriptor.description, &memory);
        prompts::layer(profile, &role)
    }

    pub fn remember(&mut self, ripple: &Ripple, energy: f64, source: &str, response_type: ResponseType) {
        self.memory.push(MemoryEntry {
            ripple_preview: ripple.preview(MEMORY_PREVIEW_CHARS),
            ripple_energy: energy,
            ripple_source: source.to_string(),
            response_type,
        });
    }
}

/// Everything a spawned participant task needs, owned.
#[derive(Debug, Clone)]
pub struct ParticipantCall {
    pub agent_id: String,
    pub kind: AgentKind,
    pub system_prompt: String,
    pub user_prompt: String,
    pub policy: RetryPolicy,
}

impl ParticipantCall {
    pub fn new(participant: &Participant, profile: &str, ripple: &Ripple, energy: f64, policy: RetryPolicy) -> Self {
        Self {
            agent_id: participant.id().to_string(),
            kind: participant.kind(),
            system_prompt: participant.system_prompt(profile),
            user_prompt: prompts::participant_user(VERDICT_SOURCE, energy, ripple.content()),
            policy,
        }
    }
}

/// Ask one participant to react.
///
/// A reply that never decodes becomes a zero-energy `ignore`. If the last
/// attempt failed in the transport the error is returned so the coordinator
/// can record a participant failure.
pub async fn respond(caller: Arc<dyn AgentCaller>, call: ParticipantCall) -> Result<ParticipantResponse, CallerError> {
    let kind = call.kind;
    let request = CallRequest {
        label: &call.agent_id,
        system_prompt: &call.system_prompt,
        user_prompt: &call.user_prompt,
    };
    let decoded = call_with_retry(caller.as_ref(), request, call.policy, None, |raw| {
        ParticipantResponse::parse(kind, raw)
    })
    .await;

    match decoded {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(exhausted)) => match exhausted.last_error {
            AttemptError::Caller(e) => Err(e),
            AttemptError::Parse(e) => {
                warn!(agent_id = %call.agent_id, error = %e, "Participant reply unusable; ignoring ripple");
                Ok(ParticipantResponse::ignore_fallback(format!("unusable reply: {}", e)))
            }
        },
        // No budget guard is passed, so a budget stop cannot happen here
        Err(e) => Err(CallerError::Refused(e.to_string())),
    }
}

/// The run's participants, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ParticipantRegistry {
    order: Vec<String>,
    agents: HashMap<String, Participant>,
}

impl ParticipantRegistry {
    /// Register every descriptor. A repeated id keeps the first registration.
    pub fn from_descriptors<'a, I>(descriptors: I, memory_window: usize) -> Self
    where
        I: IntoIterator<Item = &'a AgentDescriptor>,
    {
        let mut registry = Self::default();
        for desc in descriptors {
            registry.register(Participant::new(desc.clone(), memory_window));
        }
        registry
    }

    pub fn register(&mut self, participant: Participant) -> bool {
        let id = participant.id().to_string();
        if self.agents.contains_key(&id) {
            warn!(agent_id = %id, "Duplicate participant id ignored");
            return false;
        }
        self.order.push(id.clone());
        self.agents.insert(id, participant);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.agents.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.agents.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<AgentKind> {
        self.agents.get(id).map(Participant::kind)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Participants in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }

    /// First registered participant of `kind`.
    pub fn first_of_kind(&self, kind: AgentKind) -> Option<&Participant> {
        self.iter().find(|p| p.kind() == kind)
    }

    /// `(descriptor, memory size)` pairs for building a field snapshot.
    pub fn snapshot_entries(&self) -> impl Iterator<Item = (&AgentDescriptor, usize)> {
        self.iter().map(|p| (p.descriptor(), p.memory().len()))
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }
}
