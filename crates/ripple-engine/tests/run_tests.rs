//! End-to-end runs through the full phase plan with scripted callers.
//!
//! Tests verify:
//! - a complete run produces records, observation and synthesis
//! - the wave-0 group guard reaches a sea when the verdict names none
//! - the safety ceiling ends endless propagation
//! - unknown agents are dropped and recorded, never called
//! - a failing participant is isolated to an error response
//! - INIT failure ends the run; verdict failure stops safely
//! - a stop verdict without a reason falls back to the default reason
//! - OBSERVE failure continues with an unknown phase vector
//! - SYNTHESIZE picks the anchored template only with historical data
//! - the shared call budget is a hard stop
//! - progress is monotone and spans [0, 1]

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use ripple_core::model::verdict::DEFAULT_TERMINATION_REASON;
use ripple_core::{FieldSnapshot, ResponseType, WaveEvent, WaveRecord};
use ripple_engine::{
    prompts, CallBudget, PersistenceSink, ProgressEventKind, RunError, StopReason,
};

use common::*;

// ── Persistence capture ──────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingPersistence {
    hooks: Mutex<Vec<String>>,
}

impl RecordingPersistence {
    fn hooks(&self) -> Vec<String> {
        self.hooks.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceSink for RecordingPersistence {
    async fn record_wave_end(
        &self,
        _run_id: &str,
        record: &WaveRecord,
        terminated: bool,
        _snapshot: &FieldSnapshot,
    ) -> anyhow::Result<()> {
        self.hooks
            .lock()
            .unwrap()
            .push(format!("wave_end:{}:{}", record.wave_number, terminated));
        Ok(())
    }

    async fn record_synthesis(&self, _run_id: &str, _synthesis: &ripple_core::Outcome<Value>) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_produces_report() {
    let decision = Arc::new(ScriptedDecision::new().with_verdicts(|wave| match wave {
        0 => continue_verdict(&[("alice", 0.8)]),
        1 => continue_verdict(&[("mainstream", 0.4)]),
        _ => stop_verdict("saturated"),
    }));
    let participants = Arc::new(ScriptedParticipants::default());
    let persistence = Arc::new(RecordingPersistence::default());
    let orchestrator = builder(decision.clone(), participants.clone())
        .persistence(persistence.clone())
        .build()
        .unwrap();

    let report = orchestrator.run(&input(), Some("run-full")).await.unwrap();

    assert_eq!(report.run_id, "run-full");
    assert_eq!(report.wave_budget.estimated_waves, 3);
    assert_eq!(report.wave_budget.max_waves, 9);
    assert_eq!(report.total_waves(), 2);
    assert_eq!(
        report.stop_reason(),
        &StopReason::Verdict {
            wave: 2,
            reason: "saturated".into()
        }
    );
    assert!(!report.is_degraded());

    let numbers: Vec<u32> = report.wave_records().iter().map(|r| r.wave_number).collect();
    assert_eq!(numbers, [0, 1]);
    assert!(report.wave_records()[1].responses.contains_key("mainstream"));

    let result = report.result_json();
    assert_eq!(result["total_waves"], 2);
    assert_eq!(result["run_id"], "run-full");
    assert_eq!(result["observation"]["phase_vector"]["heat"], "peak");
    assert_eq!(result["prediction"]["confidence"], "medium");

    assert_eq!(
        decision.calls(),
        [
            "init:dynamics",
            "init:agents",
            "init:topology",
            "verdict:0",
            "verdict:1",
            "verdict:2",
            "observe",
            "synthesize",
        ]
    );

    // The stop verdict is persisted as a terminal record; a failing hook
    // does not abort the run.
    assert_eq!(
        persistence.hooks(),
        ["wave_end:0:false", "wave_end:1:false", "wave_end:2:true"]
    );

    let names: Vec<&str> = report.phase_timings.iter().map(|t| t.phase.as_str()).collect();
    assert_eq!(names, ["INIT", "SEED", "RIPPLE", "OBSERVE", "SYNTHESIZE"]);
}

#[tokio::test]
async fn wave_zero_guard_reaches_first_sea() {
    let decision = Arc::new(ScriptedDecision::new());
    let participants = Arc::new(ScriptedParticipants::default());
    let orchestrator = builder(decision, participants.clone()).build().unwrap();

    let report = orchestrator.run(&input(), None).await.unwrap();
    let wave0 = &report.wave_records()[0];

    assert!(wave0.responses.contains_key("alice"));
    assert!(wave0.responses.contains_key("early_adopters"));
    assert!(!wave0.responses.contains_key("mainstream"));

    let injected = wave0
        .events
        .iter()
        .find_map(|e| match e {
            WaveEvent::GroupGuardInjected { agent_id, energy } => Some((agent_id.clone(), *energy)),
            _ => None,
        })
        .expect("guard event");
    assert_eq!(injected.0, "early_adopters");
    // Seed energy 0.8 × guard factor 0.3
    assert!((injected.1 - 0.24).abs() < 1e-9);

    let mut seen = participants.seen();
    seen.sort();
    assert_eq!(seen, ["alice", "early_adopters"]);
}

// ── Ceilings and degradation ─────────────────────────────────────────────────

#[tokio::test]
async fn safety_ceiling_ends_endless_propagation() {
    let decision = Arc::new(
        ScriptedDecision::new().with_verdicts(|_| continue_verdict(&[("early_adopters", 0.5)])),
    );
    let participants = Arc::new(ScriptedParticipants::default());
    let orchestrator = builder(decision.clone(), participants).build().unwrap();

    let report = orchestrator.run(&input(), None).await.unwrap();

    assert_eq!(report.total_waves(), 9);
    assert_eq!(report.stop_reason(), &StopReason::SafetyCutoff { max_waves: 9 });
    assert!(report.is_degraded());
    assert_eq!(decision.count("verdict:"), 9);
    // OBSERVE and SYNTHESIZE still run after the cutoff.
    assert_eq!(decision.count("observe"), 1);
    assert!(!report.synthesis.is_degraded());
}

#[tokio::test]
async fn unknown_agent_is_dropped_and_recorded() {
    let decision = Arc::new(ScriptedDecision::new().with_verdicts(|wave| {
        if wave == 0 {
            continue_verdict(&[("ghost", 0.9), ("early_adopters", 0.5)])
        } else {
            stop_verdict("done")
        }
    }));
    let participants = Arc::new(ScriptedParticipants::default());
    let orchestrator = builder(decision, participants.clone()).build().unwrap();

    let report = orchestrator.run(&input(), None).await.unwrap();
    let wave0 = &report.wave_records()[0];

    assert!(!wave0.responses.contains_key("ghost"));
    assert!(wave0.events.contains(&WaveEvent::UnknownAgentDropped {
        agent_id: "ghost".into()
    }));
    assert!(!participants.seen().contains(&"ghost".to_string()));
}

#[tokio::test]
async fn failing_participant_is_isolated() {
    let decision = Arc::new(ScriptedDecision::new().with_verdicts(|wave| {
        if wave == 0 {
            continue_verdict(&[("early_adopters", 0.5), ("mainstream", 0.5), ("alice", 0.7)])
        } else {
            stop_verdict("done")
        }
    }));
    let participants = Arc::new(ScriptedParticipants::failing(&["mainstream"]));
    let orchestrator = builder(decision, participants).build().unwrap();

    let report = orchestrator.run(&input(), None).await.unwrap();
    let wave0 = &report.wave_records()[0];

    assert_eq!(wave0.responses.len(), 3);
    assert_eq!(wave0.responses["mainstream"].response_type, ResponseType::Error);
    assert_eq!(wave0.responses["alice"].response_type, ResponseType::Amplify);
    assert!(wave0
        .events
        .iter()
        .any(|e| matches!(e, WaveEvent::ParticipantFailed { agent_id, .. } if agent_id == "mainstream")));
    assert!(!report.synthesis.is_degraded());
}

#[tokio::test]
async fn init_failure_ends_the_run() {
    let decision = Arc::new(
        ScriptedDecision::new().with_agents(r#"{"star_configs": [], "sea_configs": []}"#),
    );
    let participants = Arc::new(ScriptedParticipants::default());
    let progress = Arc::new(CapturedProgress::default());
    let orchestrator = builder(decision.clone(), participants)
        .progress_sink(progress.clone())
        .build()
        .unwrap();

    let err = orchestrator.run(&input(), None).await.unwrap_err();

    match &err {
        RunError::Configuration { step, attempts, .. } => {
            assert_eq!(step, "agents");
            assert_eq!(*attempts, 2);
        }
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert!(err.is_fatal());
    assert_eq!(decision.count("init:agents"), 2);
    assert_eq!(decision.count("init:topology"), 0);

    let events = progress.events();
    let last = events.last().unwrap();
    assert_eq!(last.kind, ProgressEventKind::Error);
    assert_eq!(last.phase, "INIT");
    assert_eq!(last.detail.as_ref().unwrap()["category"], "configuration");
}

#[tokio::test]
async fn verdict_failure_stops_safely() {
    let decision = Arc::new(ScriptedDecision::new().with_verdicts(|_| "no json here".to_string()));
    let participants = Arc::new(ScriptedParticipants::default());
    let orchestrator = builder(decision.clone(), participants.clone()).build().unwrap();

    let report = orchestrator.run(&input(), None).await.unwrap();

    assert_eq!(report.total_waves(), 0);
    assert!(matches!(report.stop_reason(), StopReason::VerdictFailed { wave: 0, .. }));
    assert!(report.is_degraded());
    assert_eq!(decision.count("verdict:0"), 2);
    assert!(participants.seen().is_empty());
    assert_eq!(decision.count("synthesize"), 1);
}

#[tokio::test]
async fn stop_without_reason_uses_default() {
    let decision = Arc::new(ScriptedDecision::new().with_verdicts(|wave| {
        if wave == 0 {
            continue_verdict(&[("alice", 0.8)])
        } else {
            serde_json::json!({"continue_propagation": false, "activated_agents": []}).to_string()
        }
    }));
    let participants = Arc::new(ScriptedParticipants::default());
    let orchestrator = builder(decision, participants).build().unwrap();

    let report = orchestrator.run(&input(), None).await.unwrap();

    assert_eq!(
        report.stop_reason(),
        &StopReason::Verdict {
            wave: 1,
            reason: DEFAULT_TERMINATION_REASON.into()
        }
    );
    assert!(!report.is_degraded());
}

// ── Late-phase fallbacks ─────────────────────────────────────────────────────

#[tokio::test]
async fn observe_failure_continues_with_unknown_state() {
    let decision = Arc::new(ScriptedDecision::new().with_observation("the crowd seems excited"));
    let participants = Arc::new(ScriptedParticipants::default());
    let orchestrator = builder(decision.clone(), participants).build().unwrap();

    let report = orchestrator.run(&input(), None).await.unwrap();

    assert!(report.observation.is_degraded());
    assert_eq!(report.observation.value()["phase_vector"]["heat"], "unknown");
    assert_eq!(report.observation.value()["phase_vector"]["coherence"], "unknown");
    assert!(report.is_degraded());

    // Both attempts spent, then SYNTHESIZE still runs and succeeds.
    assert_eq!(decision.count("observe"), 2);
    assert_eq!(decision.count("synthesize"), 1);
    assert!(!report.synthesis.is_degraded());
    let result = report.result_json();
    assert_eq!(result["observation"]["phase_vector"]["sentiment"], "unknown");
    assert_eq!(result["prediction"]["confidence"], "medium");
}

#[tokio::test]
async fn synthesis_template_follows_historical_data() {
    let relative = Arc::new(ScriptedDecision::new());
    builder(relative.clone(), Arc::new(ScriptedParticipants::default()))
        .build()
        .unwrap()
        .run(&input(), None)
        .await
        .unwrap();

    let anchored = Arc::new(ScriptedDecision::new());
    let with_history = input().with_field(
        "historical",
        serde_json::json!([{"product": "last year's model", "units_first_week": 12000}]),
    );
    builder(anchored.clone(), Arc::new(ScriptedParticipants::default()))
        .build()
        .unwrap()
        .run(&with_history, None)
        .await
        .unwrap();

    let systems = relative.synthesis_systems();
    assert_eq!(systems.len(), 1);
    assert!(systems[0].contains(prompts::SYNTHESIZE_RELATIVE_SYSTEM));
    assert!(!systems[0].contains(prompts::SYNTHESIZE_ANCHORED_SYSTEM));

    let systems = anchored.synthesis_systems();
    assert_eq!(systems.len(), 1);
    assert!(systems[0].contains(prompts::SYNTHESIZE_ANCHORED_SYSTEM));
    assert!(!systems[0].contains(prompts::SYNTHESIZE_RELATIVE_SYSTEM));
}

#[tokio::test]
async fn budget_exhaustion_is_a_hard_stop() {
    let decision = Arc::new(
        ScriptedDecision::new().with_verdicts(|_| continue_verdict(&[("early_adopters", 0.5)])),
    );
    let participants = Arc::new(ScriptedParticipants::default());
    // Three INIT calls and two verdicts.
    let budget = Arc::new(CallBudget::new(5));
    let orchestrator = builder(decision.clone(), participants)
        .budget(budget.clone())
        .build()
        .unwrap();

    let err = orchestrator.run(&input(), None).await.unwrap_err();

    assert!(err.is_budget_exhausted());
    assert_eq!(budget.used(), 5);
    assert_eq!(decision.count("verdict:"), 2);
    assert_eq!(decision.count("observe"), 0);
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_is_monotone_across_the_run() {
    let decision = Arc::new(ScriptedDecision::new().with_verdicts(|wave| {
        if wave < 2 {
            continue_verdict(&[("alice", 0.6), ("early_adopters", 0.4)])
        } else {
            stop_verdict("done")
        }
    }));
    let participants = Arc::new(ScriptedParticipants::default());
    let progress = Arc::new(CapturedProgress::default());
    let orchestrator = builder(decision, participants)
        .progress_sink(progress.clone())
        .build()
        .unwrap();

    orchestrator.run(&input(), Some("run-progress")).await.unwrap();
    let events = progress.events();

    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
    assert!(events.iter().all(|e| (0.0..=1.0).contains(&e.progress)));
    assert!(events.iter().all(|e| e.run_id == "run-progress"));

    let first = &events[0];
    assert_eq!(first.kind, ProgressEventKind::PhaseStart);
    assert_eq!(first.phase, "INIT");
    assert_eq!(first.progress, 0.0);

    let last = events.last().unwrap();
    assert_eq!(last.kind, ProgressEventKind::PhaseEnd);
    assert_eq!(last.phase, "SYNTHESIZE");
    assert!(last.progress > 0.999);

    let activated = events
        .iter()
        .filter(|e| e.kind == ProgressEventKind::AgentActivated)
        .count();
    assert_eq!(activated, 4);

    let terminal = events
        .iter()
        .find(|e| e.kind == ProgressEventKind::WaveEnd && e.wave == Some(2))
        .unwrap();
    assert_eq!(terminal.detail.as_ref().unwrap()["terminated"], true);
}
