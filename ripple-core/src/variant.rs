//! Variant isolation for multi-variant comparisons.
//!
//! Every variant gets the same per-run seeds, so run `i` of variant A and run
//! `i` of variant B differ only in their input. The variant name never feeds
//! the seed. Seeds also drive a reproducible shuffle of the order in which
//! variants are shown to evaluators; the shuffle never touches content or
//! scores.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Per-run seeds for a variant: `base_seed, base_seed + 1, ..`.
///
/// `_variant` is accepted so call sites read naturally, but it does not
/// influence the result.
pub fn compute_variant_seeds(_variant: &str, base_seed: u64, runs: usize) -> Vec<u64> {
    (0..runs as u64).map(|i| base_seed.wrapping_add(i)).collect()
}

/// Seeded permutation of `variants`.
pub fn shuffle_variant_order<T: Clone>(variants: &[T], seed: u64) -> Vec<T> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut shuffled = variants.to_vec();
    shuffled.shuffle(&mut rng);
    shuffled
}

/// Seeds and presentation orders for comparing several variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPlan {
    pub variants: Vec<String>,
    /// One seed per ensemble run, shared by every variant.
    pub seeds: Vec<u64>,
    /// For each run, the order variants are presented in.
    pub presentation_orders: Vec<Vec<String>>,
}

impl VariantPlan {
    pub fn new(variants: &[String], base_seed: u64, runs: usize) -> Self {
        let name = variants.first().map_or("", String::as_str);
        let seeds = compute_variant_seeds(name, base_seed, runs);
        let presentation_orders = seeds
            .iter()
            .map(|&s| shuffle_variant_order(variants, s))
            .collect();
        Self {
            variants: variants.to_vec(),
            seeds,
            presentation_orders,
        }
    }

    /// Seed for run `index`, the same for every variant.
    pub fn seed_for(&self, index: usize) -> Option<u64> {
        self.seeds.get(index).copied()
    }
}
