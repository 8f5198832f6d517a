//! Acceptance policy
//!
//! Decides, from the flat repetition list alone, whether another repetition
//! may be added, whether the analysis may be finalized, and whether the
//! rounded final weight may be set. None of these functions fail: a "no" is
//! an ordinary answer the caller must respect before mutating anything.

use super::stats::{self, WeightStatistics};
use super::types::{valid_weights, PmsAnalysis, Repetition, ValidityCounts};
use crate::config::PolicyLimits;
use serde::Serialize;
use std::fmt;

/// Which rule settled the "may add another repetition" question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AddDecision {
    /// Hard ceiling reached; overrides everything else
    CeilingReached { total: usize },
    /// The store has not classified every repetition yet
    AwaitingClassification { indeterminate: usize },
    /// Enough valid repetitions with acceptable spread
    Converged { cv: f64 },
    /// Enough valid repetitions but the CV is above threshold or undefined
    SpreadTooHigh { cv: Option<f64> },
    /// Invalid repetitions need replacing
    ReplacingInvalid { invalid: usize, valid: usize },
    /// Not enough valid repetitions yet
    NeedMoreValid { valid: usize },
}

impl AddDecision {
    pub fn allows(&self) -> bool {
        !matches!(
            self,
            AddDecision::CeilingReached { .. } | AddDecision::Converged { .. }
        )
    }
}

impl fmt::Display for AddDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddDecision::CeilingReached { total } => {
                write!(f, "repetition ceiling reached ({total} recorded)")
            }
            AddDecision::AwaitingClassification { indeterminate } => {
                write!(f, "{indeterminate} repetition(s) awaiting classification")
            }
            AddDecision::Converged { cv } => write!(f, "converged (CV {cv:.3}%)"),
            AddDecision::SpreadTooHigh { cv: Some(cv) } => {
                write!(f, "spread too high (CV {cv:.3}%)")
            }
            AddDecision::SpreadTooHigh { cv: None } => write!(f, "spread undefined (zero mean)"),
            AddDecision::ReplacingInvalid { invalid, valid } => {
                write!(f, "{invalid} invalid repetition(s) to replace, {valid} valid")
            }
            AddDecision::NeedMoreValid { valid } => write!(f, "only {valid} valid repetition(s)"),
        }
    }
}

/// Evaluates the add rules in precedence order: ceiling, pending
/// classification, enough valid repetitions, invalid replacements, shortfall.
pub fn evaluate_add(
    repetitions: &[Repetition],
    expected_per_tanda: u32,
    is_coarse_seed: bool,
    limits: &PolicyLimits,
) -> AddDecision {
    let total = repetitions.len();
    if limits.ceiling_reached(total) {
        return AddDecision::CeilingReached { total };
    }

    let counts = ValidityCounts::tally(repetitions);
    if counts.indeterminate > 0 {
        return AddDecision::AwaitingClassification {
            indeterminate: counts.indeterminate,
        };
    }

    let expected = expected_per_tanda as usize;
    if counts.valid >= expected {
        let cv = stats::compute_cv(&valid_weights(repetitions));
        return match cv {
            Some(cv) if cv <= limits.cv_threshold(is_coarse_seed) => AddDecision::Converged { cv },
            _ => AddDecision::SpreadTooHigh { cv },
        };
    }

    if counts.invalid > 0 {
        return AddDecision::ReplacingInvalid {
            invalid: counts.invalid,
            valid: counts.valid,
        };
    }

    AddDecision::NeedMoreValid { valid: counts.valid }
}

pub fn can_add_repetition(
    repetitions: &[Repetition],
    expected_per_tanda: u32,
    is_coarse_seed: bool,
    limits: &PolicyLimits,
) -> bool {
    evaluate_add(repetitions, expected_per_tanda, is_coarse_seed, limits).allows()
}

/// First unmet finalize condition, or `None` when finalizing is allowed.
pub fn finalize_blocker(
    analysis: &PmsAnalysis,
    repetitions: &[Repetition],
    limits: &PolicyLimits,
) -> Option<&'static str> {
    if analysis.state.is_locked() {
        return Some("analysis is locked for approval");
    }
    if repetitions.is_empty() {
        return Some("no repetitions recorded");
    }
    if analysis.raw_final_weight.is_none() {
        return Some("raw final weight not computed yet");
    }
    if analysis.rounded_final_weight.is_none() {
        return Some("rounded final weight not set");
    }

    let weights = valid_weights(repetitions);
    let Some(spread) = WeightStatistics::from_weights(&weights) else {
        return Some("no valid repetitions");
    };

    let threshold = limits.cv_threshold(analysis.is_coarse_seed);
    if stats::is_acceptable(spread.cv, threshold) || limits.ceiling_reached(repetitions.len()) {
        None
    } else {
        Some("coefficient of variation above threshold")
    }
}

pub fn can_finalize(analysis: &PmsAnalysis, repetitions: &[Repetition], limits: &PolicyLimits) -> bool {
    finalize_blocker(analysis, repetitions, limits).is_none()
}

/// First unmet condition for setting the rounded final weight.
pub fn rounded_weight_blocker(
    analysis: &PmsAnalysis,
    repetitions: &[Repetition],
    limits: &PolicyLimits,
) -> Option<&'static str> {
    if analysis.state.is_locked() {
        return Some("analysis is locked for approval");
    }
    if repetitions.is_empty() {
        return Some("no repetitions recorded");
    }
    if analysis.raw_final_weight.is_none() {
        return Some("raw final weight not computed yet");
    }

    let valid = ValidityCounts::tally(repetitions).valid;
    if valid >= analysis.expected_repetitions_per_tanda as usize
        || limits.ceiling_reached(repetitions.len())
    {
        None
    } else {
        Some("not enough valid repetitions")
    }
}

pub fn can_edit_rounded_weight(
    analysis: &PmsAnalysis,
    repetitions: &[Repetition],
    limits: &PolicyLimits,
) -> bool {
    rounded_weight_blocker(analysis, repetitions, limits).is_none()
}
