//! EnsembleAggregator — N full runs, strictly one after another, plus
//! cross-run statistics.
//!
//! ```text
//! seeds = base_seed .. base_seed+N
//! for (i, seed):
//!   begin_ensemble_run → run "{id}r{i+1}" with random_seed=seed → end_ensemble_run
//!   failure            → counted, logged, next run
//!   degraded synthesis → completed, contributes no grade or scores
//!   budget exhausted   → counted, stop scheduling
//! returned runs → per-dimension median/IQR/stability, grade mode, Fleiss' kappa
//! ```
//!
//! Runs are never concurrent: they share one call budget, and seed order
//! must map to run order.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use ripple_core::{
    aggregate_ordinal_scores, coerce, compute_variant_seeds, dimension_kappa, grade_agreement,
    kappa_label, DimensionAggregate, VariantPlan,
};

use crate::config::EngineConfig;
use crate::context::new_run_id;
use crate::input::SimulationInput;
use crate::persistence::{note_failure, NoopPersistence, PersistenceSink};
use crate::phase::{RunReport, SimulationRunner};

/// Variant name used for single-input ensembles.
pub const DEFAULT_VARIANT: &str = "default";
/// Input field that carries a run's seed to the collaborators.
pub const SEED_FIELD: &str = "random_seed";

const GRADE_KEYS: [&str; 3] = ["grade", "pmf_grade", "overall_grade"];
const SCORE_KEYS: [&str; 2] = ["scores", "dimension_scores"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Finished, but synthesis fell back to its default. Still a returned
    /// result: counted as completed, it just carries no grade or scores.
    SynthesisDegraded { reason: String },
    Failed { error: String },
    BudgetExhausted { error: String },
}

impl RunStatus {
    /// The run returned a result.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Completed | Self::SynthesisDegraded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::SynthesisDegraded { .. } => "synthesis_degraded",
            Self::Failed { .. } => "failed",
            Self::BudgetExhausted { .. } => "budget_exhausted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleRun {
    pub index: usize,
    pub run_id: String,
    pub seed: u64,
    #[serde(flatten)]
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
}

/// Cross-run statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleStats {
    pub runs_requested: usize,
    pub runs_completed: usize,
    pub runs_failed: usize,
    pub seeds: Vec<u64>,
    pub grade_sequence: Vec<String>,
    pub grade_mode: Option<String>,
    pub grade_agreement_rate: f64,
    pub dimension_aggregates: BTreeMap<String, DimensionAggregate>,
    pub dimension_agreement_kappa: Option<f64>,
    pub dimension_agreement_level: Option<String>,
    pub kappa_dimensions: Vec<String>,
}

impl EnsembleStats {
    /// Statistics over the valid runs in `runs`.
    pub fn from_runs(runs: &[EnsembleRun], requested: usize, seeds: &[u64]) -> Self {
        let results: Vec<Value> = runs
            .iter()
            .filter(|r| r.status.is_valid())
            .filter_map(|r| r.report.as_ref().map(RunReport::result_json))
            .collect();

        let grade_sequence: Vec<String> = results.iter().filter_map(extract_grade).collect();
        let scores: Vec<BTreeMap<String, u8>> = results.iter().filter_map(extract_scores).collect();
        let (grade_mode, grade_agreement_rate) = match grade_agreement(&grade_sequence) {
            Some((mode, rate)) => (Some(mode), rate),
            None => (None, 0.0),
        };
        let kappa = dimension_kappa(&scores);

        Self {
            runs_requested: requested,
            runs_completed: results.len(),
            runs_failed: runs.iter().filter(|r| !r.status.is_valid()).count(),
            seeds: seeds.to_vec(),
            grade_sequence,
            grade_mode,
            grade_agreement_rate,
            dimension_aggregates: aggregate_ordinal_scores(&scores),
            dimension_agreement_kappa: kappa.as_ref().map(|(k, _)| *k),
            dimension_agreement_level: kappa.as_ref().map(|(k, _)| kappa_label(*k).to_string()),
            kappa_dimensions: kappa.map(|(_, dims)| dims).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleReport {
    pub ensemble_id: String,
    pub variant: String,
    pub runs: Vec<EnsembleRun>,
    pub stats: EnsembleStats,
    /// Scheduling stopped because the call budget ran out.
    pub stopped_early: bool,
}

impl EnsembleReport {
    /// The last returned run's result with the ensemble statistics attached.
    pub fn merged_result(&self) -> Value {
        let mut merged = self
            .runs
            .iter()
            .rev()
            .filter(|r| r.status.is_valid())
            .find_map(|r| r.report.as_ref())
            .map(|report| match report.result_json() {
                Value::Object(map) => map,
                _ => Map::new(),
            })
            .unwrap_or_default();
        merged.insert("ensemble_runs_completed".to_string(), json!(self.stats.runs_completed));
        merged.insert("ensemble_runs_requested".to_string(), json!(self.stats.runs_requested));
        merged.insert("ensemble_stats".to_string(), json!(self.stats));
        Value::Object(merged)
    }
}

/// Variants compared under shared seeds.
#[derive(Debug, Clone, Serialize)]
pub struct VariantComparison {
    pub plan: VariantPlan,
    pub reports: BTreeMap<String, EnsembleReport>,
}

pub struct EnsembleAggregator {
    runner: Arc<dyn SimulationRunner>,
    runs: usize,
    base_seed: u64,
    persistence: Arc<dyn PersistenceSink>,
}

impl EnsembleAggregator {
    pub fn new(runner: Arc<dyn SimulationRunner>, runs: usize, base_seed: u64) -> Self {
        Self {
            runner,
            runs,
            base_seed,
            persistence: Arc::new(NoopPersistence),
        }
    }

    pub fn from_config(runner: Arc<dyn SimulationRunner>, config: &EngineConfig) -> Self {
        Self::new(runner, config.ensemble_runs, config.base_seed)
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = persistence;
        self
    }

    pub async fn run(&self, input: &SimulationInput, ensemble_id: Option<&str>) -> EnsembleReport {
        self.run_variant(DEFAULT_VARIANT, input, ensemble_id).await
    }

    /// Run the ensemble for one named variant. The name never affects seeds.
    pub async fn run_variant(
        &self,
        variant: &str,
        input: &SimulationInput,
        ensemble_id: Option<&str>,
    ) -> EnsembleReport {
        let ensemble_id = ensemble_id.map(str::to_string).unwrap_or_else(new_run_id);
        let seeds = compute_variant_seeds(variant, self.base_seed, self.runs);
        self.run_seeds(variant, input, &ensemble_id, &seeds).await
    }

    /// Run every variant with the same seeds. Variants execute in the first
    /// run's presentation order; each variant's runs stay sequential.
    pub async fn compare_variants(
        &self,
        variants: &[(String, SimulationInput)],
        ensemble_id: Option<&str>,
    ) -> VariantComparison {
        let ensemble_id = ensemble_id.map(str::to_string).unwrap_or_else(new_run_id);
        let names: Vec<String> = variants.iter().map(|(n, _)| n.clone()).collect();
        let plan = VariantPlan::new(&names, self.base_seed, self.runs);
        let order = plan.presentation_orders.first().cloned().unwrap_or_else(|| names.clone());

        let mut reports = BTreeMap::new();
        for name in &order {
            let Some((_, input)) = variants.iter().find(|(n, _)| n == name) else {
                continue;
            };
            let id = format!("{}-{}", ensemble_id, name);
            let report = self.run_seeds(name, input, &id, &plan.seeds).await;
            let stop = report.stopped_early;
            reports.insert(name.clone(), report);
            if stop {
                warn!(ensemble_id = %ensemble_id, variant = %name, "Budget exhausted; skipping remaining variants");
                break;
            }
        }
        VariantComparison { plan, reports }
    }

    async fn run_seeds(
        &self,
        variant: &str,
        input: &SimulationInput,
        ensemble_id: &str,
        seeds: &[u64],
    ) -> EnsembleReport {
        info!(ensemble_id, variant, runs = seeds.len(), "Ensemble starting");
        let mut runs = Vec::with_capacity(seeds.len());
        let mut stopped_early = false;

        for (index, &seed) in seeds.iter().enumerate() {
            let run_id = format!("{}r{}", ensemble_id, index + 1);
            note_failure(
                "begin_ensemble_run",
                &run_id,
                self.persistence.begin_ensemble_run(ensemble_id, index, seed).await,
            );
            let run_input = input.clone().with_field(SEED_FIELD, json!(seed));

            let (status, report) = match self.runner.run_simulation(&run_input, Some(&run_id), Some(seed)).await {
                Ok(report) => match report.synthesis.reason() {
                    None => (RunStatus::Completed, Some(report)),
                    Some(reason) => {
                        warn!(run_id = %run_id, reason, "Ensemble run synthesis degraded");
                        let status = RunStatus::SynthesisDegraded {
                            reason: reason.to_string(),
                        };
                        (status, Some(report))
                    }
                },
                Err(e) if e.is_budget_exhausted() => {
                    warn!(run_id = %run_id, error = %e, "Ensemble run hit the call budget; stopping");
                    stopped_early = true;
                    (RunStatus::BudgetExhausted { error: e.to_string() }, None)
                }
                Err(e) => {
                    warn!(run_id = %run_id, seed, error = %e, "Ensemble run failed");
                    (RunStatus::Failed { error: e.to_string() }, None)
                }
            };

            let summary = json!({
                "run_id": run_id,
                "seed": seed,
                "status": status.label(),
                "total_waves": report.as_ref().map(RunReport::total_waves),
            });
            note_failure(
                "end_ensemble_run",
                &run_id,
                self.persistence.end_ensemble_run(ensemble_id, index, &summary).await,
            );
            runs.push(EnsembleRun {
                index,
                run_id,
                seed,
                status,
                report,
            });
            if stopped_early {
                break;
            }
        }

        let stats = EnsembleStats::from_runs(&runs, seeds.len(), seeds);
        if stats.runs_failed > 0 {
            warn!(
                ensemble_id,
                failed = stats.runs_failed,
                requested = stats.runs_requested,
                "Ensemble finished with failed runs"
            );
        }
        info!(
            ensemble_id,
            completed = stats.runs_completed,
            grade_mode = ?stats.grade_mode,
            kappa = ?stats.dimension_agreement_kappa,
            "Ensemble complete"
        );
        EnsembleReport {
            ensemble_id: ensemble_id.to_string(),
            variant: variant.to_string(),
            runs,
            stats,
            stopped_early,
        }
    }
}

// ── Result extraction ───────────────────────────────────────────────────────

/// First string grade under `grade`, `pmf_grade` or `overall_grade`.
pub fn extract_grade(result: &Value) -> Option<String> {
    GRADE_KEYS.iter().find_map(|k| {
        result
            .get(*k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
    })
}

/// Ordinal scores from the largest candidate map.
///
/// Candidates: top-level `scores`/`dimension_scores`, the same keys under
/// `scorecard`, and `scorecard.dimensions.*.score`. Values that are not
/// integers in 1..=5 are dropped.
pub fn extract_scores(result: &Value) -> Option<BTreeMap<String, u8>> {
    let mut candidates: Vec<Map<String, Value>> = Vec::new();
    for key in SCORE_KEYS {
        if let Some(map) = result.get(key).and_then(Value::as_object) {
            candidates.push(map.clone());
        }
    }
    if let Some(card) = result.get("scorecard").and_then(Value::as_object) {
        for key in SCORE_KEYS {
            if let Some(map) = card.get(key).and_then(Value::as_object) {
                candidates.push(map.clone());
            }
        }
        if let Some(dims) = card.get("dimensions").and_then(Value::as_object) {
            let extracted: Map<String, Value> = dims
                .iter()
                .filter_map(|(dim, payload)| payload.get("score").map(|s| (dim.clone(), s.clone())))
                .collect();
            if !extracted.is_empty() {
                candidates.push(extracted);
            }
        }
    }

    // Largest wins; the earliest candidate wins ties.
    let mut best: Option<&Map<String, Value>> = None;
    for candidate in &candidates {
        if best.map_or(true, |b| candidate.len() > b.len()) {
            best = Some(candidate);
        }
    }
    let cleaned: BTreeMap<String, u8> = best?
        .iter()
        .filter_map(|(dim, v)| {
            let n = coerce::try_i64(v)?;
            (1..=5).contains(&n).then(|| (dim.clone(), n as u8))
        })
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_key_priority() {
        assert_eq!(extract_grade(&json!({"grade": " B ", "pmf_grade": "A"})), Some("B".into()));
        assert_eq!(extract_grade(&json!({"overall_grade": "C"})), Some("C".into()));
        assert_eq!(extract_grade(&json!({"grade": 3})), None);
        assert_eq!(extract_grade(&json!({"grade": "", "pmf_grade": "A"})), Some("A".into()));
    }

    #[test]
    fn scores_prefer_largest_candidate() {
        let result = json!({
            "scores": {"demand": 4},
            "scorecard": {
                "dimensions": {
                    "demand": {"score": 3},
                    "moat": {"score": "5"},
                    "pricing": {"score": 9},
                }
            }
        });
        let scores = extract_scores(&result).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["demand"], 3);
        assert_eq!(scores["moat"], 5);
        assert!(!scores.contains_key("pricing"));
    }

    #[test]
    fn scores_absent_or_all_invalid() {
        assert!(extract_scores(&json!({"prediction": {}})).is_none());
        assert!(extract_scores(&json!({"scores": {"demand": 0, "moat": "high"}})).is_none());
    }
}
