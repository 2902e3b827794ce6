//! Engine configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`RIPPLE_*`)
//! 2. Values loaded from a TOML file
//! 3. Built-in defaults
//!
//! | Field                       | Default | Env override                    |
//! |-----------------------------|---------|---------------------------------|
//! | decision_max_retries        | 2       | `RIPPLE_DECISION_MAX_RETRIES`   |
//! | participant_max_retries     | 1       | `RIPPLE_PARTICIPANT_MAX_RETRIES`|
//! | evaluator_max_retries       | 2       | `RIPPLE_EVALUATOR_MAX_RETRIES`  |
//! | history_window              | 5       | `RIPPLE_HISTORY_WINDOW`         |
//! | max_parallel_participants   | 8       | `RIPPLE_MAX_PARALLEL`           |
//! | deliberation_max_rounds     | 4       | `RIPPLE_DELIBERATION_ROUNDS`    |
//! | ensemble_runs               | 3       | `RIPPLE_ENSEMBLE_RUNS`          |
//! | base_seed                   | 42      | `RIPPLE_BASE_SEED`              |

use std::env;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use ripple_core::budget::{DEFAULT_ESTIMATED_WAVES, SAFETY_WAVE_MULTIPLIER};
use ripple_core::DEFAULT_HISTORY_WINDOW;

const ENV_DECISION_MAX_RETRIES: &str = "RIPPLE_DECISION_MAX_RETRIES";
const ENV_PARTICIPANT_MAX_RETRIES: &str = "RIPPLE_PARTICIPANT_MAX_RETRIES";
const ENV_EVALUATOR_MAX_RETRIES: &str = "RIPPLE_EVALUATOR_MAX_RETRIES";
const ENV_HISTORY_WINDOW: &str = "RIPPLE_HISTORY_WINDOW";
const ENV_MAX_PARALLEL: &str = "RIPPLE_MAX_PARALLEL";
const ENV_DELIBERATION_ROUNDS: &str = "RIPPLE_DELIBERATION_ROUNDS";
const ENV_ENSEMBLE_RUNS: &str = "RIPPLE_ENSEMBLE_RUNS";
const ENV_BASE_SEED: &str = "RIPPLE_BASE_SEED";

/// Tunables for one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retries per decision-agent call (INIT sub-calls, verdicts, OBSERVE, SYNTHESIZE).
    pub decision_max_retries: u32,
    /// Retries per participant call.
    pub participant_max_retries: u32,
    /// Retries per tribunal evaluate/challenge/revise call.
    pub evaluator_max_retries: u32,
    /// Waves rendered in detail in the verdict prompt.
    pub history_window: usize,
    /// Hard ceiling = estimated waves × this.
    pub safety_wave_multiplier: u32,
    /// Estimate used when durations don't parse and INIT gives none.
    pub default_estimated_waves: u32,
    pub default_energy_decay: f64,
    pub default_seed_energy: f64,
    /// Wave-0 guard energy as a fraction of the seed energy.
    pub wave0_group_energy_factor: f64,
    /// Memory entries a participant keeps.
    pub participant_memory_window: usize,
    /// Concurrent participant calls within one wave.
    pub max_parallel_participants: usize,
    pub deliberation_max_rounds: u32,
    pub ensemble_runs: usize,
    pub base_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_max_retries: 2,
            participant_max_retries: 1,
            evaluator_max_retries: 2,
            history_window: DEFAULT_HISTORY_WINDOW,
            safety_wave_multiplier: SAFETY_WAVE_MULTIPLIER,
            default_estimated_waves: DEFAULT_ESTIMATED_WAVES,
            default_energy_decay: 0.15,
            default_seed_energy: 0.5,
            wave0_group_energy_factor: 0.3,
            participant_memory_window: 5,
            max_parallel_participants: 8,
            deliberation_max_rounds: 4,
            ensemble_runs: 3,
            base_seed: 42,
        }
    }
}

impl EngineConfig {
    /// Parse from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(text).context("Failed to parse engine config TOML")?;
        Ok(cfg)
    }

    /// Load from a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        let cfg = Self::from_toml_str(&content)?.with_env_overrides();
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Apply `RIPPLE_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are
    /// ignored with a warning.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        override_field(&lookup, ENV_DECISION_MAX_RETRIES, &mut self.decision_max_retries);
        override_field(&lookup, ENV_PARTICIPANT_MAX_RETRIES, &mut self.participant_max_retries);
        override_field(&lookup, ENV_EVALUATOR_MAX_RETRIES, &mut self.evaluator_max_retries);
        override_field(&lookup, ENV_HISTORY_WINDOW, &mut self.history_window);
        override_field(&lookup, ENV_MAX_PARALLEL, &mut self.max_parallel_participants);
        override_field(&lookup, ENV_DELIBERATION_ROUNDS, &mut self.deliberation_max_rounds);
        override_field(&lookup, ENV_ENSEMBLE_RUNS, &mut self.ensemble_runs);
        override_field(&lookup, ENV_BASE_SEED, &mut self.base_seed);
        self
    }

    /// Validate; return an error string if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.safety_wave_multiplier == 0 {
            return Err("safety_wave_multiplier must be > 0".to_string());
        }
        if self.default_estimated_waves == 0 {
            return Err("default_estimated_waves must be > 0".to_string());
        }
        if self.max_parallel_participants == 0 {
            return Err("max_parallel_participants must be > 0".to_string());
        }
        if self.deliberation_max_rounds == 0 {
            return Err("deliberation_max_rounds must be > 0".to_string());
        }
        for (name, v) in [
            ("default_energy_decay", self.default_energy_decay),
            ("default_seed_energy", self.default_seed_energy),
            ("wave0_group_energy_factor", self.wave0_group_energy_factor),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("{} must be in [0, 1], got {}", name, v));
            }
        }
        Ok(())
    }
}

fn override_field<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable config override"),
        }
    }
}
