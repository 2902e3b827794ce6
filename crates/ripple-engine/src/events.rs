//! Progress events.
//!
//! A run reports progress in `[0, 1]` at phase boundaries and at finer
//! wave/agent events. The reporter clamps every value so the emitted
//! sequence never decreases, and a failing sink is logged and ignored.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use ripple_core::AgentKind;

/// Channel capacity for [`BroadcastSink`].
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    PhaseStart,
    PhaseEnd,
    WaveStart,
    WaveEnd,
    AgentActivated,
    AgentResponded,
    Error,
}

impl ProgressEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PhaseStart => "phase_start",
            Self::PhaseEnd => "phase_end",
            Self::WaveStart => "wave_start",
            Self::WaveEnd => "wave_end",
            Self::AgentActivated => "agent_activated",
            Self::AgentResponded => "agent_responded",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressEventKind,
    pub phase: String,
    pub run_id: String,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_waves: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(kind: ProgressEventKind, phase: &str, run_id: &str, progress: f64) -> Self {
        Self {
            kind,
            phase: phase.to_string(),
            run_id: run_id.to_string(),
            progress,
            wave: None,
            total_waves: None,
            agent_id: None,
            agent_type: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_wave(mut self, wave: u32, total_waves: u32) -> Self {
        self.wave = Some(wave);
        self.total_waves = Some(total_waves);
        self
    }

    pub fn with_total_waves(mut self, total_waves: u32) -> Self {
        self.total_waves = Some(total_waves);
        self
    }

    pub fn with_agent(mut self, agent_id: &str, kind: AgentKind) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self.agent_type = Some(kind);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Receives progress events. Errors are logged by the reporter and never
/// abort the run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()>;
}

/// Synchronous callback sink.
pub struct FnSink<F> {
    callback: F,
}

impl<F> FnSink<F>
where
    F: Fn(&ProgressEvent) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> ProgressSink for FnSink<F>
where
    F: Fn(&ProgressEvent) -> anyhow::Result<()> + Send + Sync,
{
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        (self.callback)(event)
    }
}

/// Fans events out to any number of subscribers over a broadcast channel.
pub struct BroadcastSink {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressSink for BroadcastSink {
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        // No subscribers is not an error
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Span {
    phase: String,
    offset: f64,
    weight: f64,
    last: f64,
}

/// Run-scoped progress reporter.
///
/// Tracks the current phase span (offset and weight within the whole run)
/// and turns a within-phase fraction into overall progress.
#[derive(Clone)]
pub struct ProgressReporter {
    run_id: Arc<str>,
    sink: Option<Arc<dyn ProgressSink>>,
    span: Arc<Mutex<Span>>,
}

impl ProgressReporter {
    pub fn new(run_id: &str, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            run_id: Arc::from(run_id),
            sink,
            span: Arc::new(Mutex::new(Span {
                phase: String::new(),
                offset: 0.0,
                weight: 0.0,
                last: 0.0,
            })),
        }
    }

    /// Reporter with no sink.
    pub fn silent(run_id: &str) -> Self {
        Self::new(run_id, None)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Enter a phase occupying `[offset, offset + weight]` of the run.
    pub fn enter(&self, phase: &str, offset: f64, weight: f64) {
        let mut span = self.lock();
        span.phase = phase.to_string();
        span.offset = offset;
        span.weight = weight;
    }

    pub fn phase(&self) -> String {
        self.lock().phase.clone()
    }

    /// Highest progress value emitted so far.
    pub fn last(&self) -> f64 {
        self.lock().last
    }

    /// Event for the current phase at `fraction` of the phase, with progress
    /// already clamped to be non-decreasing.
    pub fn event(&self, kind: ProgressEventKind, fraction: f64) -> ProgressEvent {
        let mut span = self.lock();
        let raw = span.offset + span.weight * fraction.clamp(0.0, 1.0);
        let progress = raw.clamp(0.0, 1.0).max(span.last);
        span.last = progress;
        ProgressEvent::new(kind, &span.phase, &self.run_id, progress)
    }

    /// Deliver an event to the sink, if there is one.
    pub async fn emit(&self, event: ProgressEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.emit(&event).await {
            warn!(
                run_id = %self.run_id,
                event = event.kind.as_str(),
                error = %e,
                "Progress sink failed; continuing"
            );
        }
    }

    /// Build and emit in one step.
    pub async fn report(&self, kind: ProgressEventKind, fraction: f64) {
        let event = self.event(kind, fraction);
        self.emit(event).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Span> {
        self.span.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
