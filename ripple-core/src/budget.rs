//! Wave budgeting.
//!
//! The number of waves a run plans for is derived from two duration strings
//! when both parse: `ceil(horizon / window)`. Otherwise the decision agent's
//! own estimate is used. The hard ceiling is the estimate times a fixed
//! multiplier and is enforced regardless of what verdicts say.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Waves assumed when no estimate is available.
pub const DEFAULT_ESTIMATED_WAVES: u32 = 10;
/// Ceiling multiplier applied to the estimate.
pub const SAFETY_WAVE_MULTIPLIER: u32 = 3;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*([hd])$").expect("DURATION_RE regex should compile")
});

/// Parse `"4h"`, `"2.5h"`, `"1d"` (case-insensitive, surrounding whitespace
/// ignored) into hours. Anything else is 0.
pub fn parse_hours(s: &str) -> f64 {
    let s = s.trim().to_ascii_lowercase();
    let Some(caps) = DURATION_RE.captures(&s) else {
        return 0.0;
    };
    let Ok(n) = caps[1].parse::<f64>() else {
        return 0.0;
    };
    match &caps[2] {
        "d" => n * 24.0,
        _ => n,
    }
}

/// Where the wave estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum WaveBudgetSource {
    /// `ceil(horizon_hours / window_hours)`.
    Deterministic { horizon_hours: f64, window_hours: f64 },
    /// The decision agent's estimate, or the default.
    Estimate,
}

/// Planned and maximum wave counts for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveBudget {
    pub estimated_waves: u32,
    pub max_waves: u32,
    pub source: WaveBudgetSource,
}

impl WaveBudget {
    /// Compute the budget. `estimate` is only consulted when the durations
    /// do not both parse; the result is never below one wave.
    pub fn compute(horizon: &str, window: &str, estimate: Option<i64>, multiplier: u32) -> Self {
        let horizon_hours = parse_hours(horizon);
        let window_hours = parse_hours(window);

        let (estimated, source) = if horizon_hours > 0.0 && window_hours > 0.0 {
            let waves = (horizon_hours / window_hours).ceil();
            (
                waves.min(f64::from(u32::MAX)) as u32,
                WaveBudgetSource::Deterministic {
                    horizon_hours,
                    window_hours,
                },
            )
        } else {
            let est = estimate.unwrap_or(i64::from(DEFAULT_ESTIMATED_WAVES));
            (
                est.clamp(0, i64::from(u32::MAX)) as u32,
                WaveBudgetSource::Estimate,
            )
        };

        let estimated_waves = estimated.max(1);
        Self {
            estimated_waves,
            max_waves: estimated_waves.saturating_mul(multiplier.max(1)),
            source,
        }
    }

    /// Fraction of the planned waves completed after `waves_done`, capped at 1.
    pub fn fraction(&self, waves_done: u32) -> f64 {
        (f64::from(waves_done) / f64::from(self.estimated_waves.max(1))).min(1.0)
    }
}

/// Simulated time position at a given wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeProgress {
    pub wave_time_window: String,
    pub simulation_horizon: String,
    pub elapsed_hours: f64,
    pub remaining_hours: f64,
}

impl TimeProgress {
    /// `None` unless both durations parse.
    pub fn at_wave(wave: u32, window: &str, horizon: &str) -> Option<Self> {
        let window_h = parse_hours(window);
        let horizon_h = parse_hours(horizon);
        if window_h <= 0.0 || horizon_h <= 0.0 {
            return None;
        }
        let elapsed_hours = f64::from(wave) * window_h;
        Some(Self {
            wave_time_window: window.to_string(),
            simulation_horizon: horizon.to_string(),
            elapsed_hours,
            remaining_hours: (horizon_h - elapsed_hours).max(0.0),
        })
    }

    pub fn describe(&self, wave: u32) -> String {
        format!(
            "Each wave covers {}. Wave {} starts at {}h elapsed of {}, {}h remaining.",
            self.wave_time_window,
            wave,
            self.elapsed_hours,
            self.simulation_horizon,
            self.remaining_hours
        )
    }
}
