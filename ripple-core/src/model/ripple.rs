//! Ripple — the propagating content unit.
//!
//! A run creates exactly one seed ripple at SEED. Every later ripple is
//! produced by [`Ripple::derive`], so lineage always forms a tree rooted at
//! the seed: a child's `root_id` is copied from its parent, never computed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Origin actor id used for the seed ripple.
pub const SEED_ORIGIN: &str = "omniscient";
/// Type tag used for the seed ripple.
pub const SEED_TYPE: &str = "seed";

/// A unit of content moving through the actor population.
///
/// Fields are read-only after construction. New state is expressed by
/// deriving a child ripple, not by mutating an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ripple {
    id: String,
    content: String,
    energy: f64,
    origin_agent: String,
    ripple_type: String,
    emotion: BTreeMap<String, f64>,
    trace: Vec<String>,
    tick_born: u32,
    mutations: Vec<serde_json::Value>,
    parent_id: Option<String>,
    root_id: String,
}

impl Ripple {
    /// Deterministic seed id for a run.
    pub fn seed_id(run_id: &str) -> String {
        format!("ripple_{}_seed", run_id)
    }

    /// Create the root ripple of a run. Energy is clamped to `[0, 1]`.
    pub fn seed(run_id: &str, content: impl Into<String>, energy: f64) -> Self {
        let id = Self::seed_id(run_id);
        Self {
            root_id: id.clone(),
            id,
            content: content.into(),
            energy: clamp_energy(energy),
            origin_agent: SEED_ORIGIN.to_string(),
            ripple_type: SEED_TYPE.to_string(),
            emotion: BTreeMap::new(),
            trace: vec![SEED_ORIGIN.to_string()],
            tick_born: 0,
            mutations: Vec::new(),
            parent_id: None,
        }
    }

    /// Produce a child ripple emitted by `emitter` at wave `tick`.
    ///
    /// The child inherits this ripple's root, records this ripple as its
    /// parent, and extends the trace with the emitter.
    pub fn derive(
        &self,
        id: impl Into<String>,
        emitter: &str,
        content: impl Into<String>,
        energy: f64,
        ripple_type: impl Into<String>,
        tick: u32,
    ) -> Self {
        let mut trace = self.trace.clone();
        trace.push(emitter.to_string());
        Self {
            id: id.into(),
            content: content.into(),
            energy: clamp_energy(energy),
            origin_agent: emitter.to_string(),
            ripple_type: ripple_type.into(),
            emotion: self.emotion.clone(),
            trace,
            tick_born: tick,
            mutations: Vec::new(),
            parent_id: Some(self.id.clone()),
            root_id: self.root_id.clone(),
        }
    }

    /// Replace the emotion map of a freshly derived ripple.
    pub fn with_emotion(mut self, emotion: BTreeMap<String, f64>) -> Self {
        self.emotion = emotion;
        self
    }

    /// Append a semantic-drift entry to a freshly derived ripple.
    pub fn with_mutation(mut self, mutation: serde_json::Value) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn origin_agent(&self) -> &str {
        &self.origin_agent
    }

    pub fn ripple_type(&self) -> &str {
        &self.ripple_type
    }

    pub fn emotion(&self) -> &BTreeMap<String, f64> {
        &self.emotion
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn tick_born(&self) -> u32 {
        self.tick_born
    }

    pub fn mutations(&self) -> &[serde_json::Value] {
        &self.mutations
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Whether this is a root ripple (no parent, root is itself).
    pub fn is_seed(&self) -> bool {
        self.parent_id.is_none() && self.root_id == self.id
    }

    /// First `max_chars` characters of the content.
    pub fn preview(&self, max_chars: usize) -> String {
        self.content.chars().take(max_chars).collect()
    }
}

fn clamp_energy(energy: f64) -> f64 {
    if energy.is_nan() {
        0.0
    } else {
        energy.clamp(0.0, 1.0)
    }
}
