use super::policy::AddDecision;
use super::store::StoreError;
use super::types::AnalysisState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PmsError {
    #[error("pms: invalid input: {0}")]
    InvalidInput(String),
    #[error("pms: no further repetitions may be added: {0}")]
    AddRefused(AddDecision),
    #[error("pms: analysis is {0} and cannot be edited")]
    Locked(AnalysisState),
    #[error("pms: operation not permitted: {0}")]
    NotPermitted(&'static str),
    #[error("pms: malformed snapshot: {0}")]
    MalformedSnapshot(String),
    #[error("pms: repetition {0} not found")]
    RepetitionNotFound(String),
    #[error("pms: store error: {0}")]
    Store(#[from] StoreError),
}
