use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Validity of a repetition as classified by the store.
///
/// On the wire this is a nullable boolean: `true`, `false`, or `null`/absent
/// for a repetition the store has not classified yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Validity {
    Valid,
    Invalid,
    #[default]
    Indeterminate,
}

impl Validity {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Validity::Valid,
            Some(false) => Validity::Invalid,
            None => Validity::Indeterminate,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Validity::Valid => Some(true),
            Validity::Invalid => Some(false),
            Validity::Indeterminate => None,
        }
    }

    pub fn is_valid(self) -> bool {
        self == Validity::Valid
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::Valid => write!(f, "valid"),
            Validity::Invalid => write!(f, "invalid"),
            Validity::Indeterminate => write!(f, "pending"),
        }
    }
}

impl Serialize for Validity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_flag().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Validity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Validity::from_flag)
    }
}

/// One weighed sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repetition {
    /// Assigned by the store; absent until saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// 1-based position within its tanda
    pub rep_number: u32,

    /// Batch this repetition belongs to
    pub tanda_number: u32,

    /// Weight in grams
    pub weight: f64,

    #[serde(default)]
    pub valid: Validity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Repetition {
    pub fn new(tanda_number: u32, rep_number: u32, weight: f64) -> Self {
        Self {
            id: None,
            rep_number,
            tanda_number,
            weight,
            valid: Validity::Indeterminate,
            recorded_at: None,
        }
    }

    pub fn with_validity(mut self, valid: Validity) -> Self {
        self.valid = valid;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Fields sent to the store when creating a repetition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepetitionDraft {
    pub tanda_number: u32,
    pub rep_number: u32,
    pub weight: f64,
}

/// Fields sent to the store when updating a repetition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepetitionUpdate {
    pub tanda_number: u32,
    pub rep_number: u32,
    pub weight: f64,
    #[serde(default)]
    pub valid: Validity,
}

/// Analysis lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    #[default]
    Registered,
    InProgress,
    Finalized,
    PendingApproval,
    Approved,
    ForRepeat,
}

impl AnalysisState {
    /// Approved and pending-approval analyses accept no further edits.
    pub fn is_locked(self) -> bool {
        matches!(self, AnalysisState::Approved | AnalysisState::PendingApproval)
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisState::Registered => "REGISTERED",
            AnalysisState::InProgress => "IN_PROGRESS",
            AnalysisState::Finalized => "FINALIZED",
            AnalysisState::PendingApproval => "PENDING_APPROVAL",
            AnalysisState::Approved => "APPROVED",
            AnalysisState::ForRepeat => "FOR_REPEAT",
        };
        f.write_str(name)
    }
}

/// A thousand-seed-weight analysis record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmsAnalysis {
    pub id: String,

    /// Fixed at creation
    pub expected_repetitions_per_tanda: u32,

    /// Selects the relaxed CV threshold; fixed at creation
    #[serde(default)]
    pub is_coarse_seed: bool,

    /// Batches opened so far (store maintained)
    #[serde(default = "default_tanda_count")]
    pub tanda_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_weight: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_deviation: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coef_variation: Option<f64>,

    /// Human-confirmed result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounded_final_weight: Option<f64>,

    /// Machine-computed result, present once enough valid data exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_final_weight: Option<f64>,

    #[serde(default)]
    pub state: AnalysisState,
}

fn default_tanda_count() -> u32 {
    1
}

impl PmsAnalysis {
    pub fn new(id: impl Into<String>, expected_repetitions_per_tanda: u32, is_coarse_seed: bool) -> Self {
        Self {
            id: id.into(),
            expected_repetitions_per_tanda,
            is_coarse_seed,
            tanda_count: default_tanda_count(),
            average_weight: None,
            std_deviation: None,
            coef_variation: None,
            rounded_final_weight: None,
            raw_final_weight: None,
            state: AnalysisState::Registered,
        }
    }
}

/// Repetition counts partitioned by validity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidityCounts {
    pub valid: usize,
    pub invalid: usize,
    pub indeterminate: usize,
}

impl ValidityCounts {
    pub fn tally<'a>(repetitions: impl IntoIterator<Item = &'a Repetition>) -> Self {
        let mut counts = Self::default();
        for rep in repetitions {
            match rep.valid {
                Validity::Valid => counts.valid += 1,
                Validity::Invalid => counts.invalid += 1,
                Validity::Indeterminate => counts.indeterminate += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.valid + self.invalid + self.indeterminate
    }
}

/// Weights of the repetitions classified as valid, in list order.
pub fn valid_weights(repetitions: &[Repetition]) -> Vec<f64> {
    repetitions
        .iter()
        .filter(|r| r.valid.is_valid())
        .map(|r| r.weight)
        .collect()
}
