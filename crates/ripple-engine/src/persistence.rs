//! Persistence hooks.
//!
//! A run calls these at its INIT, SEED, wave, observation, extra-phase and
//! synthesis boundaries; an ensemble calls the run hooks around each run.
//! The storage format belongs to the implementor. Every hook defaults to a
//! no-op, and a failing hook is logged without aborting the run.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use ripple_core::{FieldSnapshot, Outcome, Ripple, WaveBudget, WaveRecord};

use crate::decision::InitResult;

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_init(&self, _run_id: &str, _init: &InitResult, _budget: &WaveBudget) -> anyhow::Result<()> {
        Ok(())
    }

    async fn record_seed(&self, _run_id: &str, _seed: &Ripple) -> anyhow::Result<()> {
        Ok(())
    }

    async fn record_wave_start(&self, _run_id: &str, _wave: u32, _snapshot: &FieldSnapshot) -> anyhow::Result<()> {
        Ok(())
    }

    /// `terminated` is set for the stop verdict that ended propagation. That
    /// record carries no responses and is not part of the run's wave list.
    async fn record_wave_end(
        &self,
        _run_id: &str,
        _record: &WaveRecord,
        _terminated: bool,
        _snapshot: &FieldSnapshot,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn record_observation(&self, _run_id: &str, _observation: &Outcome<Value>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Output of a registered extra phase, keyed by phase name.
    async fn record_phase_output(&self, _run_id: &str, _phase: &str, _output: &Outcome<Value>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn record_synthesis(&self, _run_id: &str, _synthesis: &Outcome<Value>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn begin_ensemble_run(&self, _ensemble_id: &str, _index: usize, _seed: u64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn end_ensemble_run(&self, _ensemble_id: &str, _index: usize, _summary: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPersistence;

impl PersistenceSink for NoopPersistence {}

/// Log a failed hook and carry on.
pub(crate) fn note_failure(hook: &str, run_id: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        warn!(hook, run_id, error = %e, "Persistence hook failed; continuing");
    }
}
