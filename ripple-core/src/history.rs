//! Bounded propagation history for prompting.
//!
//! The last `window` waves render as one detailed line each. Everything
//! older folds into a single summary line. The rendered text therefore
//! grows with the window, not with the run length. Storage is unaffected:
//! this only shapes what the decision agent reads.

use std::collections::BTreeMap;

use crate::model::WaveRecord;

/// Default number of waves kept in full detail.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    window: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl HistoryWindow {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// At most one summary line followed by `min(records, window)` detail lines.
    pub fn render(&self, records: &[WaveRecord]) -> String {
        let cutoff = records.len().saturating_sub(self.window);
        let (older, recent) = records.split_at(cutoff);

        let mut lines = Vec::with_capacity(recent.len() + 1);
        let mut running = activation_counts(older);
        if !older.is_empty() {
            lines.push(summary_line(older));
        }
        for record in recent {
            lines.push(detail_line(record, &mut running));
        }
        lines.join("\n")
    }

    /// Every wave in detail. Used once, for the observation phase.
    pub fn render_full(records: &[WaveRecord]) -> String {
        let mut running = BTreeMap::new();
        records
            .iter()
            .map(|r| detail_line(r, &mut running))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn activation_counts(records: &[WaveRecord]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for record in records {
        for act in &record.verdict.activated_agents {
            *counts.entry(act.agent_id.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// Descending by count, ties by key.
fn ranked(counts: BTreeMap<String, u32>) -> Vec<(String, u32)> {
    let mut v: Vec<(String, u32)> = counts.into_iter().collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v
}

fn summary_line(records: &[WaveRecord]) -> String {
    let first = records.first().map_or(0, |r| r.wave_number);
    let last = records.last().map_or(0, |r| r.wave_number);

    let mut responses: BTreeMap<String, u32> = BTreeMap::new();
    let mut total_out = 0.0;
    for record in records {
        for act in &record.verdict.activated_agents {
            let (rtype, out) = record
                .response(&act.agent_id)
                .map_or(("unknown", 0.0), |r| (r.response_type.as_str(), r.outgoing_energy));
            *responses.entry(rtype.to_string()).or_insert(0) += 1;
            total_out += out;
        }
    }

    let agents = ranked(activation_counts(records));
    let agent_part = if agents.is_empty() {
        "none".to_string()
    } else {
        agents
            .iter()
            .map(|(id, n)| format!("{}×{}", id, n))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let response_part = ranked(responses)
        .iter()
        .map(|(t, n)| format!("{}({})", t, n))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Wave {}-{} summary: activated {}; total outgoing energy={:.1}; responses: {}",
        first, last, agent_part, total_out, response_part
    )
}

fn detail_line(record: &WaveRecord, running: &mut BTreeMap<String, u32>) -> String {
    if record.verdict.activated_agents.is_empty() {
        return format!("Wave {}: no activations", record.wave_number);
    }
    let parts: Vec<String> = record
        .verdict
        .activated_agents
        .iter()
        .map(|act| {
            let n = running.entry(act.agent_id.clone()).or_insert(0);
            *n += 1;
            let (rtype, out) = record
                .response(&act.agent_id)
                .map_or(("unknown", 0.0), |r| (r.response_type.as_str(), r.outgoing_energy));
            format!(
                "{} → {} (in={:.2}, out={:.2}) [activation #{}]",
                act.agent_id, rtype, act.incoming_ripple_energy, out, n
            )
        })
        .collect();
    format!("Wave {}: {}", record.wave_number, parts.join("; "))
}
