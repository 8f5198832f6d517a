pub mod config;
pub mod pms;

// Re-export common types
pub use crate::config::{PolicyLimits, SeedlabConfig};
pub use crate::pms::{
    AnalysisState, PmsAnalysis, PmsError, PmsSession, PmsSnapshot, PmsStore, PolicyFlags,
    Repetition, StoreError, TandaGroup, Validity,
};
