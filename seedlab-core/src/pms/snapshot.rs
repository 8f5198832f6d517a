use super::errors::PmsError;
use super::grouping::{group_by_tanda, TandaGroup};
use super::policy::{self, AddDecision};
use super::stats::WeightStatistics;
use super::tanda;
use super::types::{valid_weights, PmsAnalysis, Repetition, ValidityCounts};
use crate::config::PolicyLimits;
use serde::{Deserialize, Serialize};

/// Analysis record plus its repetitions, as last confirmed by the store.
///
/// Policy decisions read a snapshot and never modify it; a new snapshot is
/// fetched after every successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmsSnapshot {
    pub analysis: PmsAnalysis,
    #[serde(default)]
    pub repetitions: Vec<Repetition>,
}

/// Every derived flag for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyFlags {
    pub can_add_repetition: bool,
    pub add_decision: AddDecision,
    pub can_finalize: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize_blocker: Option<&'static str>,
    pub can_edit_rounded_weight: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rounded_weight_blocker: Option<&'static str>,
    pub current_tanda: u32,
    pub next_repetition_number: u32,
    pub counts: ValidityCounts,
    pub valid_statistics: Option<WeightStatistics>,
    pub cv_threshold: f64,
}

impl PmsSnapshot {
    pub fn new(analysis: PmsAnalysis, repetitions: Vec<Repetition>) -> Self {
        Self {
            analysis,
            repetitions,
        }
    }

    /// Reject data that breaks the engine's invariants.
    pub fn validate(&self) -> Result<(), PmsError> {
        let analysis = &self.analysis;
        if analysis.expected_repetitions_per_tanda == 0 {
            return Err(PmsError::MalformedSnapshot(
                "expected repetitions per tanda must be at least 1".into(),
            ));
        }
        if analysis.tanda_count == 0 {
            return Err(PmsError::MalformedSnapshot(
                "tanda count must be at least 1".into(),
            ));
        }

        for rep in &self.repetitions {
            if rep.tanda_number == 0 || rep.rep_number == 0 {
                return Err(PmsError::MalformedSnapshot(format!(
                    "repetition {}/{} uses a zero tanda or repetition number",
                    rep.tanda_number, rep.rep_number
                )));
            }
            if !rep.weight.is_finite() || rep.weight < 0.0 {
                return Err(PmsError::MalformedSnapshot(format!(
                    "repetition {}/{} has weight {}",
                    rep.tanda_number, rep.rep_number, rep.weight
                )));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.repetitions.len()
    }

    pub fn counts(&self) -> ValidityCounts {
        ValidityCounts::tally(&self.repetitions)
    }

    pub fn find(&self, id: &str) -> Option<&Repetition> {
        self.repetitions
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
    }

    pub fn current_tanda(&self) -> u32 {
        tanda::current_tanda(
            &self.repetitions,
            self.analysis.expected_repetitions_per_tanda,
            self.analysis.tanda_count,
        )
    }

    pub fn next_repetition_number(&self) -> u32 {
        tanda::next_repetition_number(&self.repetitions, self.current_tanda())
    }

    pub fn grouped_by_tanda(&self) -> Vec<TandaGroup> {
        group_by_tanda(
            &self.repetitions,
            self.analysis.tanda_count,
            self.analysis.expected_repetitions_per_tanda,
        )
    }

    pub fn valid_statistics(&self) -> Option<WeightStatistics> {
        WeightStatistics::from_weights(&valid_weights(&self.repetitions))
    }

    pub fn evaluate_add(&self, limits: &PolicyLimits) -> AddDecision {
        policy::evaluate_add(
            &self.repetitions,
            self.analysis.expected_repetitions_per_tanda,
            self.analysis.is_coarse_seed,
            limits,
        )
    }

    pub fn can_add_repetition(&self, limits: &PolicyLimits) -> bool {
        self.evaluate_add(limits).allows()
    }

    pub fn can_finalize(&self, limits: &PolicyLimits) -> bool {
        policy::can_finalize(&self.analysis, &self.repetitions, limits)
    }

    pub fn can_edit_rounded_weight(&self, limits: &PolicyLimits) -> bool {
        policy::can_edit_rounded_weight(&self.analysis, &self.repetitions, limits)
    }

    pub fn flags(&self, limits: &PolicyLimits) -> PolicyFlags {
        let add_decision = self.evaluate_add(limits);
        let finalize_blocker = policy::finalize_blocker(&self.analysis, &self.repetitions, limits);
        let rounded_weight_blocker =
            policy::rounded_weight_blocker(&self.analysis, &self.repetitions, limits);

        PolicyFlags {
            can_add_repetition: add_decision.allows(),
            add_decision,
            can_finalize: finalize_blocker.is_none(),
            finalize_blocker,
            can_edit_rounded_weight: rounded_weight_blocker.is_none(),
            rounded_weight_blocker,
            current_tanda: self.current_tanda(),
            next_repetition_number: self.next_repetition_number(),
            counts: self.counts(),
            valid_statistics: self.valid_statistics(),
            cv_threshold: limits.cv_threshold(self.analysis.is_coarse_seed),
        }
    }
}
