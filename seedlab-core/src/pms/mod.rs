//! Thousand-seed-weight (PMS) repetition and tanda validity engine.
//!
//! Every decision is a pure function of a [`PmsSnapshot`]: the analysis record
//! plus its flat repetition list, as last returned by the store. After each
//! mutation the snapshot is re-fetched and all flags are derived again from
//! scratch.
//!
//! # Components
//!
//! - **Tanda assignment**: which batch the next repetition goes into
//! - **Statistics**: mean, population standard deviation and CV of valid weights
//! - **Acceptance policy**: add / finalize / edit-rounded-weight decisions
//! - **Grouping**: per-tanda read model for display
//! - **Classification**: reference rendition of the server-side recomputation
//! - **Session**: guarded mutations against a [`PmsStore`]

pub mod classify;
pub mod errors;
pub mod grouping;
pub mod policy;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod tanda;
pub mod types;

pub use classify::{reclassify, Classification};
pub use errors::PmsError;
pub use grouping::{group_by_tanda, TandaGroup};
pub use policy::{
    can_add_repetition, can_edit_rounded_weight, can_finalize, evaluate_add, AddDecision,
};
pub use session::{parse_rounded_weight, PmsSession};
pub use snapshot::{PmsSnapshot, PolicyFlags};
pub use stats::{compute_cv, cv_threshold, WeightStatistics};
pub use store::{MemoryStore, PmsStore, StoreError, StoreHandle};
pub use tanda::{current_tanda, next_repetition_number};
pub use types::{
    AnalysisState, PmsAnalysis, Repetition, RepetitionDraft, RepetitionUpdate, Validity,
    ValidityCounts,
};
