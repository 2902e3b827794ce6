//! Run-scoped context.
//!
//! Everything a phase or wave needs that is not part of its direct input:
//! identity, configuration, the call budget, progress reporting and
//! persistence. One context per run; nothing in it is process-global, so
//! independent runs can execute side by side.

use std::sync::Arc;

use uuid::Uuid;

use crate::budget::{BudgetGuard, Unlimited};
use crate::config::EngineConfig;
use crate::events::{ProgressReporter, ProgressSink};
use crate::persistence::{NoopPersistence, PersistenceSink};

/// Length of generated run ids.
const RUN_ID_LEN: usize = 8;

/// Short random run id.
pub fn new_run_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(RUN_ID_LEN);
    id
}

/// Shared execution context passed to every phase and wave call.
///
/// All shared fields sit behind `Arc` so a context is cheap to clone.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub config: Arc<EngineConfig>,
    pub budget: Arc<dyn BudgetGuard>,
    pub progress: ProgressReporter,
    pub persistence: Arc<dyn PersistenceSink>,
    /// Seed assigned by an ensemble, if any.
    pub seed: Option<u64>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, config: Arc<EngineConfig>) -> Self {
        let run_id = run_id.into();
        Self {
            progress: ProgressReporter::silent(&run_id),
            run_id,
            config,
            budget: Arc::new(Unlimited),
            persistence: Arc::new(NoopPersistence),
            seed: None,
        }
    }

    pub fn with_budget(mut self, budget: Arc<dyn BudgetGuard>) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_progress_sink(mut self, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        self.progress = ProgressReporter::new(&self.run_id, sink);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("seed", &self.seed)
            .field("budget_ceiling", &self.budget.ceiling())
            .finish_non_exhaustive()
    }
}
