//! Shared call budget.
//!
//! The budget guard is consulted before every decision-agent call. A denied
//! check is a hard stop for the run; an ensemble sharing the guard stops
//! scheduling further runs.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

/// Decides whether one more call may be made.
pub trait BudgetGuard: Send + Sync {
    /// Reserve one call for `role`. Returns `false` once the ceiling is hit.
    fn check(&self, role: &str) -> bool;
    fn ceiling(&self) -> u64;
}

/// Counting budget with a fixed ceiling, safe to share across runs.
#[derive(Debug)]
pub struct CallBudget {
    ceiling: u64,
    used: AtomicU64,
}

impl CallBudget {
    pub fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            used: AtomicU64::new(0),
        }
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u64 {
        self.ceiling.saturating_sub(self.used())
    }
}

impl BudgetGuard for CallBudget {
    fn check(&self, role: &str) -> bool {
        let granted = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.ceiling).then_some(used + 1)
            })
            .is_ok();
        if !granted {
            warn!(role, ceiling = self.ceiling, "Call budget exhausted");
        }
        granted
    }

    fn ceiling(&self) -> u64 {
        self.ceiling
    }
}

/// Budget that never refuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl BudgetGuard for Unlimited {
    fn check(&self, _role: &str) -> bool {
        true
    }

    fn ceiling(&self) -> u64 {
        u64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_to_ceiling() {
        let budget = CallBudget::new(2);
        assert!(budget.check("decision"));
        assert!(budget.check("decision"));
        assert!(!budget.check("decision"));
        assert_eq!(budget.used(), 2);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn zero_ceiling_refuses_immediately() {
        assert!(!CallBudget::new(0).check("decision"));
        assert!(Unlimited.check("anything"));
    }
}
