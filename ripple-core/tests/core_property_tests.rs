//! Core property tests — deterministic invariants of the pure building blocks.
//!
//! Tests verify:
//! - Wave budgets derive from horizon/window durations
//! - Seed and derived ripples keep a tree-shaped lineage
//! - Prompt history stays bounded for any run length
//! - Median/IQR and Fleiss' kappa reference values
//! - Variant seeds never depend on the variant name

use std::collections::BTreeMap;

use ripple_core::{
    compute_variant_seeds, fleiss_kappa, median_iqr, shuffle_variant_order, AgentActivation,
    HistoryWindow, OmniscientVerdict, ParticipantResponse, Ripple, WaveBudget, WaveRecord,
};

/// A continuing wave that activates `agents` and records an ignore for each.
fn wave(n: u32, agents: &[&str]) -> WaveRecord {
    let mut verdict = OmniscientVerdict::fallback(n, "");
    verdict.continue_propagation = true;
    verdict.termination_reason = None;
    let mut responses = BTreeMap::new();
    for id in agents {
        verdict
            .activated_agents
            .push(AgentActivation::new(*id, 0.4, "fixture"));
        responses.insert(id.to_string(), ParticipantResponse::ignore_fallback("fixture"));
    }
    WaveRecord {
        wave_number: n,
        verdict,
        responses,
        events: Vec::new(),
    }
}

#[test]
fn test_wave_budget_from_durations() {
    let b = WaveBudget::compute("48h", "4h", None, 3);
    assert_eq!(b.estimated_waves, 12);
    assert_eq!(b.max_waves, 36);

    let b = WaveBudget::compute("1d", "2h", None, 3);
    assert_eq!(b.estimated_waves, 12);

    let b = WaveBudget::compute(" 48H", "4 h", None, 3);
    assert_eq!(b.estimated_waves, 12);
}

#[test]
fn test_ripple_lineage_is_a_tree() {
    let seed = Ripple::seed("run00001", "a new oat latte", 0.5);
    assert_eq!(seed.root_id(), seed.id());
    assert!(seed.parent_id().is_none());

    let mut frontier = vec![seed.clone()];
    for tick in 1..=4u32 {
        let next: Vec<Ripple> = frontier
            .iter()
            .enumerate()
            .flat_map(|(i, parent)| {
                (0..2).map(move |k| {
                    parent.derive(
                        format!("{}_{}_{}", parent.id(), i, k),
                        &format!("agent_{}", k),
                        "variation",
                        parent.energy() * 0.8,
                        "repost",
                        tick,
                    )
                })
            })
            .collect();
        for child in &next {
            assert_eq!(child.root_id(), seed.id());
            assert_ne!(child.parent_id(), Some(child.id()));
            assert_eq!(child.trace().len() as u32, tick + 1);
        }
        frontier = next;
    }
    assert_eq!(frontier.len(), 16);
}

#[test]
fn test_history_is_bounded_for_any_length() {
    for window in [1usize, 3, 5] {
        for total in 0..20u32 {
            let records: Vec<WaveRecord> = (0..total).map(|n| wave(n, &["kol", "crowd"])).collect();
            let text = HistoryWindow::new(window).render(&records);
            let lines: Vec<&str> = text.lines().collect();
            let summaries = lines.iter().filter(|l| l.contains("summary:")).count();
            let details = lines.len() - summaries;

            assert!(summaries <= 1, "window={} total={}", window, total);
            assert_eq!(details, (total as usize).min(window), "window={} total={}", window, total);
        }
    }
}

#[test]
fn test_median_iqr_reference() {
    assert_eq!(median_iqr(&[1.0, 2.0, 3.0, 4.0, 5.0]), (3.0, 2.0));
    assert_eq!(median_iqr(&[1.0, 2.0, 3.0, 4.0]), (2.5, 2.0));
    assert_eq!(median_iqr(&[4.0]), (4.0, 0.0));
}

#[test]
fn test_fleiss_kappa_reference() {
    assert!((fleiss_kappa(&[[3u32, 0, 0, 0, 0]]) - 1.0).abs() < 1e-9);
    assert!(fleiss_kappa(&[[1u32, 1, 1, 0, 0]]) < 0.1);
}

#[test]
fn test_variant_seeds_are_name_independent() {
    assert_eq!(compute_variant_seeds("A", 42, 3), compute_variant_seeds("B", 42, 3));
    let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    for seed in compute_variant_seeds("A", 42, 3) {
        assert_eq!(shuffle_variant_order(&names, seed), shuffle_variant_order(&names, seed));
    }
}
