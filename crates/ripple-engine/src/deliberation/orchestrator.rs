//! DeliberationOrchestrator — the multi-round tribunal debate.
//!
//! ```text
//! round 0        every member evaluates the evidence independently
//! round r ≥ 1    each member challenges its max-gap opponent
//!                → each member revises (challenges aimed at it, or all)
//!                → threshold gate: every score moved ≤ 1?
//!                → two stable transitions in a row ⇒ converged, stop
//! round max-1    stop, converged = false
//! ```
//!
//! Calls run one at a time, in member order, so the record sequence is
//! reproducible for a given caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use ripple_core::{
    max_gap_opponent, partition_agreement, Challenge, ConvergenceTracker, DeliberationRecord,
    EvidencePack, Outcome, TribunalMember, TribunalOpinion,
};

use super::tribunal::TribunalAgent;
use crate::caller::AgentCaller;
use crate::config::EngineConfig;
use crate::prompts;

/// Final positions of a finished deliberation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliberationSummary {
    pub rounds_executed: usize,
    pub converged: bool,
    pub final_positions: Vec<FinalPosition>,
    pub consensus_points: Vec<String>,
    pub dissent_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalPosition {
    pub member_role: String,
    pub scores: BTreeMap<String, u8>,
}

impl DeliberationSummary {
    pub fn from_records(records: &[DeliberationRecord]) -> Self {
        let Some(last) = records.last() else {
            return Self {
                rounds_executed: 0,
                converged: false,
                final_positions: Vec::new(),
                consensus_points: Vec::new(),
                dissent_points: Vec::new(),
            };
        };
        Self {
            rounds_executed: records.len(),
            converged: last.converged,
            final_positions: last
                .opinions
                .iter()
                .map(|o| FinalPosition {
                    member_role: o.member_role.clone(),
                    scores: o.scores.clone(),
                })
                .collect(),
            consensus_points: last.consensus_points.clone(),
            dissent_points: last.dissent_points.clone(),
        }
    }
}

pub struct DeliberationOrchestrator {
    members: Vec<TribunalAgent>,
    dimensions: Vec<String>,
    rubric: String,
    max_rounds: u32,
}

impl DeliberationOrchestrator {
    /// `max_rounds` counts every round, round 0 included.
    pub fn new(members: Vec<TribunalAgent>, dimensions: Vec<String>, max_rounds: u32) -> Self {
        Self {
            members,
            dimensions,
            rubric: prompts::TRIBUNAL_DEFAULT_RUBRIC.to_string(),
            max_rounds,
        }
    }

    /// One seat per member on a shared caller, with retries and the round
    /// ceiling taken from `config`. `profile` becomes every seat's system
    /// prompt together with the default rubric.
    pub fn from_config(
        members: Vec<TribunalMember>,
        caller: Arc<dyn AgentCaller>,
        dimensions: Vec<String>,
        profile: &str,
        config: &EngineConfig,
    ) -> Self {
        let system = prompts::tribunal_system(profile, prompts::TRIBUNAL_DEFAULT_RUBRIC);
        let seats = members
            .into_iter()
            .map(|m| {
                TribunalAgent::new(m, caller.clone(), config.evaluator_max_retries).with_system_prompt(system.clone())
            })
            .collect();
        Self::new(seats, dimensions, config.deliberation_max_rounds)
    }

    pub fn with_rubric(mut self, rubric: impl Into<String>) -> Self {
        let rubric = rubric.into();
        if !rubric.trim().is_empty() {
            self.rubric = rubric;
        }
        self
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// Run the debate over `evidence`.
    ///
    /// The outcome is degraded when any evaluate or revise call fell back to
    /// its safe default; the records are complete either way.
    pub async fn run(&self, evidence: &EvidencePack) -> Outcome<Vec<DeliberationRecord>> {
        if self.members.is_empty() {
            warn!("Deliberation requested with no tribunal members");
            return Outcome::degraded(Vec::new(), "tribunal has no members");
        }
        let evidence_text = serde_json::to_string(evidence).unwrap_or_else(|_| json!({}).to_string());

        let mut failures: Vec<String> = Vec::new();
        let mut records: Vec<DeliberationRecord> = Vec::new();
        let mut tracker = ConvergenceTracker::default();

        let mut previous = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let out = member.evaluate(&evidence_text, &self.rubric, &self.dimensions).await;
            note(&mut failures, member.role(), &out);
            previous.push(out.into_value());
        }
        records.push(self.record(0, previous.clone(), Vec::new(), false));

        for round in 1..self.max_rounds {
            let challenges = self.challenge_round(&previous).await;
            let mut current = Vec::with_capacity(self.members.len());
            for (i, member) in self.members.iter().enumerate() {
                let received = addressed_to(member.role(), &challenges);
                let out = member.revise(&previous[i], &received, round).await;
                note(&mut failures, member.role(), &out);
                current.push(out.into_value());
            }

            let converged = tracker.observe(&previous, &current, &self.dimensions);
            records.push(self.record(round, current.clone(), challenges, converged));
            previous = current;

            if converged {
                info!(
                    round,
                    stable_transitions = tracker.consecutive_stable(),
                    "Deliberation converged"
                );
                break;
            }
        }

        info!(rounds = records.len(), degraded_calls = failures.len(), "Deliberation finished");
        if failures.is_empty() {
            Outcome::ok(records)
        } else {
            Outcome::degraded(records, failures.join("; "))
        }
    }

    async fn challenge_round(&self, opinions: &[TribunalOpinion]) -> Vec<Challenge> {
        let mut challenges = Vec::with_capacity(self.members.len());
        for (i, member) in self.members.iter().enumerate() {
            let Some(target) = max_gap_opponent(i, opinions, &self.dimensions) else {
                continue;
            };
            challenges.push(member.challenge(&opinions[target]).await.into_value());
        }
        challenges
    }

    fn record(
        &self,
        round_number: u32,
        opinions: Vec<TribunalOpinion>,
        challenges: Vec<Challenge>,
        converged: bool,
    ) -> DeliberationRecord {
        let (consensus_points, dissent_points) = partition_agreement(&opinions, &self.dimensions);
        DeliberationRecord {
            round_number,
            opinions,
            challenges,
            consensus_points,
            dissent_points,
            converged,
        }
    }
}

/// Challenges aimed at `role`; all of them when none are.
fn addressed_to(role: &str, challenges: &[Challenge]) -> Vec<String> {
    let mine: Vec<String> = challenges
        .iter()
        .filter(|c| c.target == role)
        .map(|c| c.challenge.clone())
        .collect();
    if mine.is_empty() {
        challenges.iter().map(|c| c.challenge.clone()).collect()
    } else {
        mine
    }
}

fn note<T>(failures: &mut Vec<String>, role: &str, outcome: &Outcome<T>) {
    if let Some(reason) = outcome.reason() {
        failures.push(format!("{}: {}", role, reason));
    }
}
