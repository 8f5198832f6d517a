//! Reference server-side recomputation
//!
//! The authoritative store classifies repetitions after every mutation and the
//! engine only reads the result. This module is the in-process rendition used
//! by [`MemoryStore`](super::store::MemoryStore), following the ISTA
//! thousand-seed-weight procedure:
//!
//! - a tanda is *filled* once it holds the expected number of repetitions;
//!   repetitions of unfilled tandas stay indeterminate
//! - repetitions of filled tandas are pooled and any weight further than two
//!   standard deviations from the pooled mean is invalid
//! - when every tanda is full of valid repetitions but the CV is still above
//!   threshold, a new tanda is opened, up to the repetition ceiling

use super::stats::{self, WeightStatistics};
use super::types::{PmsAnalysis, Repetition, Validity};
use crate::config::PolicyLimits;
use std::collections::{BTreeMap, BTreeSet};

/// Distance from the pooled mean, in standard deviations, beyond which a
/// repetition is discarded.
pub const OUTLIER_SIGMAS: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// One entry per input repetition, same order
    pub validities: Vec<Validity>,
    pub tanda_count: u32,
    /// Statistics over the repetitions classified valid
    pub statistics: Option<WeightStatistics>,
    pub raw_final_weight: Option<f64>,
}

impl Classification {
    /// Write the classification back onto the stored records.
    pub fn apply(&self, analysis: &mut PmsAnalysis, repetitions: &mut [Repetition]) {
        for (rep, validity) in repetitions.iter_mut().zip(&self.validities) {
            rep.valid = *validity;
        }
        analysis.tanda_count = self.tanda_count;
        analysis.average_weight = self.statistics.map(|s| s.mean);
        analysis.std_deviation = self.statistics.map(|s| s.std_dev);
        analysis.coef_variation = self.statistics.and_then(|s| s.cv);
        analysis.raw_final_weight = self.raw_final_weight;
    }
}

pub fn reclassify(
    analysis: &PmsAnalysis,
    repetitions: &[Repetition],
    limits: &PolicyLimits,
) -> Classification {
    let expected = analysis.expected_repetitions_per_tanda as usize;

    let mut per_tanda: BTreeMap<u32, usize> = BTreeMap::new();
    for rep in repetitions {
        *per_tanda.entry(rep.tanda_number).or_default() += 1;
    }
    let filled: BTreeSet<u32> = per_tanda
        .iter()
        .filter(|(_, &count)| count >= expected)
        .map(|(&tanda, _)| tanda)
        .collect();

    let pooled: Vec<f64> = repetitions
        .iter()
        .filter(|r| filled.contains(&r.tanda_number))
        .map(|r| r.weight)
        .collect();
    let spread = WeightStatistics::from_weights(&pooled);

    let validities: Vec<Validity> = repetitions
        .iter()
        .map(|rep| {
            if !filled.contains(&rep.tanda_number) {
                return Validity::Indeterminate;
            }
            match spread {
                Some(s) if (rep.weight - s.mean).abs() > OUTLIER_SIGMAS * s.std_dev => {
                    Validity::Invalid
                }
                _ => Validity::Valid,
            }
        })
        .collect();

    let valid: Vec<(u32, f64)> = repetitions
        .iter()
        .zip(&validities)
        .filter(|(_, v)| v.is_valid())
        .map(|(r, _)| (r.tanda_number, r.weight))
        .collect();
    let weights: Vec<f64> = valid.iter().map(|&(_, w)| w).collect();
    let statistics = WeightStatistics::from_weights(&weights);

    let total = repetitions.len();
    let threshold = limits.cv_threshold(analysis.is_coarse_seed);
    let mut tanda_count = analysis.tanda_count.max(1);

    let every_tanda_full = (1..=tanda_count)
        .all(|tanda| valid.iter().filter(|&&(t, _)| t == tanda).count() >= expected);
    if every_tanda_full
        && !stats::is_acceptable(statistics.and_then(|s| s.cv), threshold)
        && !limits.ceiling_reached(total)
    {
        tanda_count += 1;
        log::info!(
            "Analysis {}: opening tanda {} (CV above {threshold}%)",
            analysis.id,
            tanda_count
        );
    }

    let raw_final_weight = statistics
        .filter(|_| weights.len() >= expected || limits.ceiling_reached(total))
        .map(|s| s.mean);

    Classification {
        validities,
        tanda_count,
        statistics,
        raw_final_weight,
    }
}
