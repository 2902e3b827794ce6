//! Ensemble statistics over ordinal 1..=5 scores.
//!
//! - `median_iqr`: median and inclusive-quartile interquartile range
//! - `stability_label`: dispersion class from the raw range
//! - `fleiss_kappa`: chance-corrected agreement over an items×categories matrix

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Number of ordinal categories (scores 1..=5).
pub const ORDINAL_CATEGORIES: usize = 5;

fn median_sorted(v: &[f64]) -> f64 {
    let n = v.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    }
}

/// Median and interquartile range.
///
/// Odd-length inputs include the median in both halves when forming Q1 and
/// Q3. Empty input gives `(0, 0)`; a single value gives `(v, 0)`.
pub fn median_iqr(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = median_sorted(&sorted);
    let n = sorted.len();
    if n < 2 {
        return (median, 0.0);
    }
    let mid = n / 2;
    let (lower, upper) = if n % 2 == 0 {
        (&sorted[..mid], &sorted[mid..])
    } else {
        (&sorted[..=mid], &sorted[mid..])
    };
    (median, median_sorted(upper) - median_sorted(lower))
}

/// `"high"` for range ≤ 1, `"medium"` for ≤ 2, `"low"` otherwise.
pub fn stability_label(range: f64) -> &'static str {
    if range <= 1.0 {
        "high"
    } else if range <= 2.0 {
        "medium"
    } else {
        "low"
    }
}

/// Fleiss' kappa. Each row is one item; each cell counts the raters that put
/// the item in that category. The rater count is taken from the first row.
///
/// Returns 0 with fewer than two raters or no items, and 1 when chance
/// agreement is already perfect.
pub fn fleiss_kappa<R: AsRef<[u32]>>(matrix: &[R]) -> f64 {
    let Some(first) = matrix.first() else {
        return 0.0;
    };
    let first = first.as_ref();
    if first.is_empty() {
        return 0.0;
    }
    let n_items = matrix.len() as f64;
    let n_categories = first.len();
    let n_raters: f64 = first.iter().map(|&c| f64::from(c)).sum();
    if n_raters <= 1.0 {
        return 0.0;
    }

    let p_bar = matrix
        .iter()
        .map(|row| {
            let sum_sq: f64 = row.as_ref().iter().map(|&r| f64::from(r) * f64::from(r)).sum();
            (sum_sq - n_raters) / (n_raters * (n_raters - 1.0))
        })
        .sum::<f64>()
        / n_items;

    let p_e: f64 = (0..n_categories)
        .map(|j| {
            let col: f64 = matrix
                .iter()
                .map(|row| row.as_ref().get(j).map_or(0.0, |&c| f64::from(c)))
                .sum();
            let p_j = col / (n_items * n_raters);
            p_j * p_j
        })
        .sum();

    if (p_e - 1.0).abs() < f64::EPSILON {
        return 1.0;
    }
    (p_bar - p_e) / (1.0 - p_e)
}

/// `"high"` for κ ≥ 0.8, `"medium"` for ≥ 0.4, `"low"` otherwise.
pub fn kappa_label(kappa: f64) -> &'static str {
    if kappa >= 0.8 {
        "high"
    } else if kappa >= 0.4 {
        "medium"
    } else {
        "low"
    }
}

/// Category counts for a set of 1..=5 ratings. Out-of-range values are
/// clamped into the nearest bucket.
pub fn ratings_row(values: &[u8]) -> [u32; ORDINAL_CATEGORIES] {
    let mut row = [0u32; ORDINAL_CATEGORIES];
    for &v in values {
        let idx = usize::from(v.clamp(1, ORDINAL_CATEGORIES as u8)) - 1;
        row[idx] += 1;
    }
    row
}

/// Per-dimension aggregate across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionAggregate {
    pub median: f64,
    pub iqr: f64,
    pub range: f64,
    pub stability: String,
    pub values: Vec<f64>,
}

/// Aggregate each dimension over every run that scored it.
pub fn aggregate_ordinal_scores(runs: &[BTreeMap<String, u8>]) -> BTreeMap<String, DimensionAggregate> {
    let mut by_dim: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for run in runs {
        for (dim, &score) in run {
            by_dim.entry(dim.clone()).or_default().push(f64::from(score));
        }
    }

    by_dim
        .into_iter()
        .map(|(dim, values)| {
            let (median, iqr) = median_iqr(&values);
            let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let range = hi - lo;
            let agg = DimensionAggregate {
                median,
                iqr,
                range,
                stability: stability_label(range).to_string(),
                values,
            };
            (dim, agg)
        })
        .collect()
}

/// Most frequent grade and the share of runs that gave it. The earliest
/// grade wins ties.
pub fn grade_agreement(grades: &[String]) -> Option<(String, f64)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for g in grades {
        match counts.iter_mut().find(|(k, _)| *k == g.as_str()) {
            Some((_, n)) => *n += 1,
            None => counts.push((g.as_str(), 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (g, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((g, n));
        }
    }
    best.map(|(g, n)| (g.to_string(), n as f64 / grades.len() as f64))
}

/// Fleiss' kappa across dimensions, treating runs as raters.
///
/// Only dimensions scored by every run are used, and only when there are at
/// least two runs and two such dimensions. Returns the kappa and the
/// dimensions it was computed over.
pub fn dimension_kappa(runs: &[BTreeMap<String, u8>]) -> Option<(f64, Vec<String>)> {
    if runs.len() < 2 {
        return None;
    }
    let shared: Vec<String> = runs[0]
        .keys()
        .filter(|d| runs[1..].iter().all(|r| r.contains_key(*d)))
        .cloned()
        .collect();
    if shared.len() < 2 {
        return None;
    }
    let mut used = Vec::with_capacity(shared.len());
    let mut matrix: Vec<[u32; ORDINAL_CATEGORIES]> = Vec::with_capacity(shared.len());
    for dim in shared {
        let scores: Vec<u8> = runs.iter().filter_map(|r| r.get(&dim).copied()).collect();
        if scores.iter().all(|s| (1..=5).contains(s)) {
            matrix.push(ratings_row(&scores));
            used.push(dim);
        }
    }
    if matrix.len() < 2 {
        return None;
    }
    Some((fleiss_kappa(&matrix), used))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_iqr_reference_values() {
        assert_eq!(median_iqr(&[1.0, 2.0, 3.0, 4.0, 5.0]), (3.0, 2.0));
        assert_eq!(median_iqr(&[1.0, 2.0, 3.0, 4.0]), (2.5, 2.0));
        assert_eq!(median_iqr(&[4.0]), (4.0, 0.0));
        assert_eq!(median_iqr(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_median_iqr_unsorted_input() {
        assert_eq!(median_iqr(&[5.0, 1.0, 3.0]), (3.0, 2.0));
        assert_eq!(median_iqr(&[3.0, 3.0]), (3.0, 0.0));
    }

    #[test]
    fn test_stability_bands() {
        assert_eq!(stability_label(0.0), "high");
        assert_eq!(stability_label(1.0), "high");
        assert_eq!(stability_label(2.0), "medium");
        assert_eq!(stability_label(3.0), "low");
    }

    #[test]
    fn test_kappa_perfect_and_chance() {
        assert!((fleiss_kappa(&[[3u32, 0, 0, 0, 0]]) - 1.0).abs() < 1e-9);
        assert!(fleiss_kappa(&[[1u32, 1, 1, 0, 0]]) < 0.1);
    }

    #[test]
    fn test_kappa_degenerate() {
        let empty: [[u32; 5]; 0] = [];
        assert_eq!(fleiss_kappa(&empty), 0.0);
        assert_eq!(fleiss_kappa(&[[1u32, 0, 0, 0, 0]]), 0.0);
        assert_eq!(fleiss_kappa(&[Vec::<u32>::new()]), 0.0);
    }

    #[test]
    fn test_kappa_textbook_mixed() {
        // two items, two raters: one agreed, one split
        let k = fleiss_kappa(&[[2u32, 0, 0, 0, 0], [0, 1, 1, 0, 0]]);
        assert!(k > -1.0 && k < 1.0);
        // p_bar = 0.5, p_e = 0.5^2 + 0.25^2 + 0.25^2 = 0.375
        assert!((k - (0.5 - 0.375) / (1.0 - 0.375)).abs() < 1e-9);
    }

    #[test]
    fn test_kappa_labels() {
        assert_eq!(kappa_label(0.85), "high");
        assert_eq!(kappa_label(0.4), "medium");
        assert_eq!(kappa_label(0.1), "low");
    }

    fn run(pairs: &[(&str, u8)]) -> BTreeMap<String, u8> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_aggregate_scores() {
        let runs = vec![
            run(&[("demand", 4), ("moat", 2)]),
            run(&[("demand", 5), ("moat", 5)]),
            run(&[("demand", 4)]),
        ];
        let agg = aggregate_ordinal_scores(&runs);
        assert_eq!(agg["demand"].median, 4.0);
        assert_eq!(agg["demand"].range, 1.0);
        assert_eq!(agg["demand"].stability, "high");
        assert_eq!(agg["moat"].values, vec![2.0, 5.0]);
        assert_eq!(agg["moat"].stability, "low");
    }

    #[test]
    fn test_grade_agreement() {
        let grades: Vec<String> = ["B", "A", "B", "A"].iter().map(|s| s.to_string()).collect();
        assert_eq!(grade_agreement(&grades), Some(("B".to_string(), 0.5)));
        assert_eq!(grade_agreement(&[]), None);
    }

    #[test]
    fn test_dimension_kappa_requirements() {
        let one = vec![run(&[("a", 3), ("b", 3)])];
        assert!(dimension_kappa(&one).is_none());

        let one_shared = vec![run(&[("a", 3), ("b", 3)]), run(&[("a", 3)])];
        assert!(dimension_kappa(&one_shared).is_none());

        let agree = vec![run(&[("a", 3), ("b", 4)]), run(&[("a", 3), ("b", 4)])];
        let (k, dims) = dimension_kappa(&agree).unwrap();
        assert!((k - 1.0).abs() < 1e-9);
        assert_eq!(dims, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_dimension_kappa_reports_rated_dimensions_only() {
        // "c" is shared but carries an out-of-range score, so it is left out.
        let runs = vec![
            run(&[("a", 3), ("b", 4), ("c", 9)]),
            run(&[("a", 3), ("b", 4), ("c", 2)]),
        ];
        let (k, dims) = dimension_kappa(&runs).unwrap();
        assert!((k - 1.0).abs() < 1e-9);
        assert_eq!(dims, vec!["a".to_string(), "b".to_string()]);

        let only_one_rated = vec![run(&[("a", 3), ("c", 0)]), run(&[("a", 3), ("c", 2)])];
        assert!(dimension_kappa(&only_one_rated).is_none());
    }
}
