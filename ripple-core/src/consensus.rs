//! Consensus rules for tribunal deliberation.
//!
//! Two gates decide convergence:
//!
//! 1. Threshold: between consecutive rounds, every member moved every
//!    dimension by at most one point.
//! 2. Persistence: the threshold gate held for
//!    [`CONSECUTIVE_STABLE_REQUIRED`] transitions in a row.

use crate::model::TribunalOpinion;

/// Stable transitions in a row needed to declare convergence.
pub const CONSECUTIVE_STABLE_REQUIRED: u32 = 2;

/// Largest per-dimension move (and spread) still counted as agreement.
pub const AGREEMENT_TOLERANCE: i32 = 1;

/// Index of the opponent whose scores differ most from member `idx`.
///
/// The gap is the sum of absolute per-dimension differences; a missing
/// dimension counts as 0. The first opponent seen wins ties. `None` when
/// there is no other member.
pub fn max_gap_opponent(idx: usize, opinions: &[TribunalOpinion], dimensions: &[String]) -> Option<usize> {
    let mine = opinions.get(idx)?;
    let mut best: Option<(usize, i32)> = None;
    for (j, other) in opinions.iter().enumerate() {
        if j == idx {
            continue;
        }
        let gap: i32 = dimensions
            .iter()
            .map(|d| (mine.score(d) - other.score(d)).abs())
            .sum();
        if best.map_or(true, |(_, g)| gap > g) {
            best = Some((j, gap));
        }
    }
    best.map(|(j, _)| j)
}

/// Threshold gate: members are matched by position.
pub fn is_stable_transition(prev: &[TribunalOpinion], curr: &[TribunalOpinion], dimensions: &[String]) -> bool {
    prev.iter().zip(curr).all(|(p, c)| {
        dimensions
            .iter()
            .all(|d| (c.score(d) - p.score(d)).abs() <= AGREEMENT_TOLERANCE)
    })
}

/// Split dimensions into (consensus, dissent) by cross-member spread.
/// With no opinions, both lists are empty.
pub fn partition_agreement(opinions: &[TribunalOpinion], dimensions: &[String]) -> (Vec<String>, Vec<String>) {
    let mut consensus = Vec::new();
    let mut dissent = Vec::new();
    if opinions.is_empty() {
        return (consensus, dissent);
    }
    for dim in dimensions {
        let scores = opinions.iter().map(|o| o.score(dim));
        let (lo, hi) = scores.fold((i32::MAX, i32::MIN), |(lo, hi), s| (lo.min(s), hi.max(s)));
        if hi - lo <= AGREEMENT_TOLERANCE {
            consensus.push(dim.clone());
        } else {
            dissent.push(dim.clone());
        }
    }
    (consensus, dissent)
}

/// Tracks the persistence gate across rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceTracker {
    consecutive_stable: u32,
    required: u32,
}

impl Default for ConvergenceTracker {
    fn default() -> Self {
        Self::new(CONSECUTIVE_STABLE_REQUIRED)
    }
}

impl ConvergenceTracker {
    pub fn new(required: u32) -> Self {
        Self {
            consecutive_stable: 0,
            required: required.max(1),
        }
    }

    /// Record one round transition. Returns true once converged.
    pub fn observe(&mut self, prev: &[TribunalOpinion], curr: &[TribunalOpinion], dimensions: &[String]) -> bool {
        if is_stable_transition(prev, curr, dimensions) {
            self.consecutive_stable += 1;
        } else {
            self.consecutive_stable = 0;
        }
        self.is_converged()
    }

    pub fn is_converged(&self) -> bool {
        self.consecutive_stable >= self.required
    }

    pub fn consecutive_stable(&self) -> u32 {
        self.consecutive_stable
    }
}
