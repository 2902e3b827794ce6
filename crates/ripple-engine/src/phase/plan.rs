//! Phase plan: built-in phases plus anchored extras, validated once.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::PhaseHandler;
use crate::error::PhasePlanError;

/// Tolerance for the rebalanced weight total.
pub const WEIGHT_TOLERANCE: f64 = 1e-2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinPhase {
    Init,
    Seed,
    Ripple,
    Observe,
    Synthesize,
}

impl BuiltinPhase {
    pub const ALL: [BuiltinPhase; 5] = [
        Self::Init,
        Self::Seed,
        Self::Ripple,
        Self::Observe,
        Self::Synthesize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Seed => "SEED",
            Self::Ripple => "RIPPLE",
            Self::Observe => "OBSERVE",
            Self::Synthesize => "SYNTHESIZE",
        }
    }

    pub fn default_weight(self) -> f64 {
        match self {
            Self::Init | Self::Seed => 0.05,
            Self::Ripple => 0.70,
            Self::Observe | Self::Synthesize => 0.10,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for BuiltinPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A caller-registered phase that runs right after `anchor`.
#[derive(Clone)]
pub struct ExtraPhase {
    pub name: String,
    pub anchor: String,
    pub weight: f64,
    pub handler: Arc<dyn PhaseHandler>,
}

impl ExtraPhase {
    pub fn new(
        name: impl Into<String>,
        anchor: impl Into<String>,
        weight: f64,
        handler: Arc<dyn PhaseHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            anchor: anchor.into(),
            weight,
            handler,
        }
    }
}

impl fmt::Debug for ExtraPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtraPhase")
            .field("name", &self.name)
            .field("anchor", &self.anchor)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub enum PlanSlot {
    Builtin(BuiltinPhase),
    Extra(Arc<dyn PhaseHandler>),
}

impl fmt::Debug for PlanSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(p) => write!(f, "Builtin({})", p),
            Self::Extra(_) => f.write_str("Extra"),
        }
    }
}

/// One phase in execution order with its normalized progress span.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub name: String,
    pub slot: PlanSlot,
    /// Share of the run's progress range, after rebalancing.
    pub weight: f64,
    /// Progress value at which this phase starts.
    pub offset: f64,
}

#[derive(Debug, Clone)]
pub struct PhasePlan {
    entries: Vec<PlanEntry>,
}

impl Default for PhasePlan {
    fn default() -> Self {
        // The built-in plan has no extras and cannot fail validation.
        Self::layout(
            BuiltinPhase::ALL
                .into_iter()
                .map(|p| (p.name().to_string(), PlanSlot::Builtin(p), p.default_weight()))
                .collect(),
        )
    }
}

impl PhasePlan {
    /// Validate `extras` and insert each immediately after its anchor.
    ///
    /// Same-anchor extras keep registration order, and an extra anchored on
    /// another extra runs right after that extra (before the next sibling).
    pub fn build(extras: Vec<ExtraPhase>) -> Result<Self, PhasePlanError> {
        let mut names: HashSet<String> = BuiltinPhase::ALL
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        for extra in &extras {
            if !names.insert(extra.name.clone()) {
                return Err(PhasePlanError::DuplicateName(extra.name.clone()));
            }
            if !extra.weight.is_finite() || extra.weight <= 0.0 || extra.weight > 1.0 {
                return Err(PhasePlanError::InvalidWeight {
                    name: extra.name.clone(),
                    weight: extra.weight,
                });
            }
        }
        for extra in &extras {
            if !names.contains(&extra.anchor) {
                return Err(PhasePlanError::UnknownAnchor {
                    name: extra.name.clone(),
                    anchor: extra.anchor.clone(),
                });
            }
        }

        let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, extra) in extras.iter().enumerate() {
            children.entry(extra.anchor.as_str()).or_default().push(i);
        }

        let mut ordered = Vec::with_capacity(BuiltinPhase::ALL.len() + extras.len());
        let mut placed = vec![false; extras.len()];
        for phase in BuiltinPhase::ALL {
            ordered.push((
                phase.name().to_string(),
                PlanSlot::Builtin(phase),
                phase.default_weight(),
            ));
            // Depth-first: each extra is followed by its own dependents.
            let mut stack: Vec<usize> = children
                .get(phase.name())
                .map(|c| c.iter().rev().copied().collect())
                .unwrap_or_default();
            while let Some(i) = stack.pop() {
                placed[i] = true;
                let extra = &extras[i];
                ordered.push((
                    extra.name.clone(),
                    PlanSlot::Extra(extra.handler.clone()),
                    extra.weight,
                ));
                if let Some(deps) = children.get(extra.name.as_str()) {
                    stack.extend(deps.iter().rev().copied());
                }
            }
        }

        let unreachable: Vec<String> = extras
            .iter()
            .zip(&placed)
            .filter(|(_, placed)| !**placed)
            .map(|(e, _)| e.name.clone())
            .collect();
        if !unreachable.is_empty() {
            return Err(PhasePlanError::Cycle(unreachable));
        }

        let plan = Self::layout(ordered);
        debug!(phases = ?plan.names(), "Phase plan built");
        Ok(plan)
    }

    fn layout(ordered: Vec<(String, PlanSlot, f64)>) -> Self {
        let total: f64 = ordered.iter().map(|(_, _, w)| w).sum();
        let mut offset = 0.0;
        let entries = ordered
            .into_iter()
            .map(|(name, slot, raw)| {
                let weight = if total > 0.0 { raw / total } else { 0.0 };
                let entry = PlanEntry {
                    name,
                    slot,
                    weight,
                    offset,
                };
                offset += weight;
                entry
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn weight_of(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.weight)
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }
}
