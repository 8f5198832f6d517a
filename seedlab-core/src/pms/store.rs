//! Repetition store collaborators
//!
//! The store owns analyses and repetitions and is the only authority on
//! validity. [`PmsStore`] is the seam the session calls through;
//! [`MemoryStore`] is an in-process implementation that runs the reference
//! classifier after every repetition mutation.

use super::classify::reclassify;
use super::policy;
use super::snapshot::PmsSnapshot;
use super::types::{AnalysisState, PmsAnalysis, Repetition, RepetitionDraft, RepetitionUpdate};
use crate::config::PolicyLimits;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PmsStore: Send + Sync {
    async fn fetch_analysis(&self, analysis_id: &str) -> Result<PmsAnalysis, StoreError>;
    async fn fetch_repetitions(&self, analysis_id: &str) -> Result<Vec<Repetition>, StoreError>;
    async fn create_repetition(
        &self,
        analysis_id: &str,
        draft: RepetitionDraft,
    ) -> Result<Repetition, StoreError>;
    async fn update_repetition(
        &self,
        analysis_id: &str,
        repetition_id: &str,
        update: RepetitionUpdate,
    ) -> Result<Repetition, StoreError>;
    async fn delete_repetition(&self, analysis_id: &str, repetition_id: &str)
        -> Result<(), StoreError>;
    async fn set_rounded_final_weight(
        &self,
        analysis_id: &str,
        value: f64,
    ) -> Result<PmsAnalysis, StoreError>;
    async fn finalize_analysis(&self, analysis_id: &str) -> Result<PmsAnalysis, StoreError>;
    async fn approve_analysis(&self, analysis_id: &str) -> Result<PmsAnalysis, StoreError>;
    async fn mark_for_repeat(&self, analysis_id: &str) -> Result<PmsAnalysis, StoreError>;
}

pub type StoreHandle = Arc<dyn PmsStore>;

struct AnalysisRecord {
    analysis: PmsAnalysis,
    repetitions: Vec<Repetition>,
}

impl AnalysisRecord {
    fn recompute(&mut self, limits: &PolicyLimits) {
        let classification = reclassify(&self.analysis, &self.repetitions, limits);
        classification.apply(&mut self.analysis, &mut self.repetitions);
    }

    fn ensure_unlocked(&self) -> Result<(), StoreError> {
        if self.analysis.state.is_locked() {
            return Err(StoreError::Rejected(format!(
                "analysis {} is {}",
                self.analysis.id, self.analysis.state
            )));
        }
        Ok(())
    }

    /// Keep the requested number unless it is taken within the tanda, in which
    /// case number after the highest one in use. Existing numbers never move.
    fn assign_rep_number(&self, tanda_number: u32, requested: u32) -> u32 {
        let in_tanda = self
            .repetitions
            .iter()
            .filter(|r| r.tanda_number == tanda_number)
            .map(|r| r.rep_number);
        let mut taken = false;
        let mut highest = 0;
        for number in in_tanda {
            taken |= number == requested;
            highest = highest.max(number);
        }
        if taken || requested == 0 {
            highest + 1
        } else {
            requested
        }
    }

    fn position(&self, repetition_id: &str) -> Result<usize, StoreError> {
        self.repetitions
            .iter()
            .position(|r| r.id.as_deref() == Some(repetition_id))
            .ok_or_else(|| StoreError::NotFound(format!("repetition {repetition_id}")))
    }
}

/// In-memory store.
pub struct MemoryStore {
    limits: PolicyLimits,
    records: RwLock<HashMap<String, AnalysisRecord>>,
}

impl MemoryStore {
    pub fn new(limits: PolicyLimits) -> Self {
        Self {
            limits,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Register an analysis together with any pre-existing repetitions.
    pub fn insert_analysis(
        &self,
        analysis: PmsAnalysis,
        repetitions: Vec<Repetition>,
    ) -> Result<(), StoreError> {
        let mut records = self.write()?;
        if records.contains_key(&analysis.id) {
            return Err(StoreError::Rejected(format!(
                "analysis {} already exists",
                analysis.id
            )));
        }
        let snapshot = PmsSnapshot::new(analysis, repetitions);
        snapshot
            .validate()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;

        let id = snapshot.analysis.id.clone();
        let mut record = AnalysisRecord {
            analysis: snapshot.analysis,
            repetitions: snapshot.repetitions,
        };
        for rep in record.repetitions.iter_mut().filter(|r| r.id.is_none()) {
            rep.id = Some(uuid::Uuid::new_v4().to_string());
        }
        record.recompute(&self.limits);
        records.insert(id, record);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, AnalysisRecord>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, AnalysisRecord>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn with_record<T>(
        &self,
        analysis_id: &str,
        f: impl FnOnce(&mut AnalysisRecord) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut records = self.write()?;
        let record = records
            .get_mut(analysis_id)
            .ok_or_else(|| StoreError::NotFound(format!("analysis {analysis_id}")))?;
        f(record)
    }
}

#[async_trait]
impl PmsStore for MemoryStore {
    async fn fetch_analysis(&self, analysis_id: &str) -> Result<PmsAnalysis, StoreError> {
        self.read()?
            .get(analysis_id)
            .map(|r| r.analysis.clone())
            .ok_or_else(|| StoreError::NotFound(format!("analysis {analysis_id}")))
    }

    async fn fetch_repetitions(&self, analysis_id: &str) -> Result<Vec<Repetition>, StoreError> {
        self.read()?
            .get(analysis_id)
            .map(|r| r.repetitions.clone())
            .ok_or_else(|| StoreError::NotFound(format!("analysis {analysis_id}")))
    }

    async fn create_repetition(
        &self,
        analysis_id: &str,
        draft: RepetitionDraft,
    ) -> Result<Repetition, StoreError> {
        let limits = self.limits;
        self.with_record(analysis_id, |record| {
            record.ensure_unlocked()?;
            if limits.ceiling_reached(record.repetitions.len()) {
                return Err(StoreError::Rejected("repetition ceiling reached".into()));
            }

            let rep_number = record.assign_rep_number(draft.tanda_number, draft.rep_number);
            let id = uuid::Uuid::new_v4().to_string();
            let mut rep = Repetition::new(draft.tanda_number, rep_number, draft.weight)
                .with_id(id.clone());
            rep.recorded_at = Some(chrono::Utc::now());
            record.repetitions.push(rep);

            if record.analysis.state == AnalysisState::Registered {
                record.analysis.state = AnalysisState::InProgress;
            }
            record.recompute(&limits);

            let index = record.position(&id)?;
            Ok(record.repetitions[index].clone())
        })
    }

    async fn update_repetition(
        &self,
        analysis_id: &str,
        repetition_id: &str,
        update: RepetitionUpdate,
    ) -> Result<Repetition, StoreError> {
        let limits = self.limits;
        self.with_record(analysis_id, |record| {
            record.ensure_unlocked()?;
            let index = record.position(repetition_id)?;
            {
                let rep = &mut record.repetitions[index];
                rep.tanda_number = update.tanda_number;
                rep.rep_number = update.rep_number;
                rep.weight = update.weight;
                // the client's view of validity is advisory; recomputation decides
                rep.valid = update.valid;
            }
            record.recompute(&limits);
            Ok(record.repetitions[index].clone())
        })
    }

    async fn delete_repetition(
        &self,
        analysis_id: &str,
        repetition_id: &str,
    ) -> Result<(), StoreError> {
        let limits = self.limits;
        self.with_record(analysis_id, |record| {
            record.ensure_unlocked()?;
            let index = record.position(repetition_id)?;
            record.repetitions.remove(index);
            record.recompute(&limits);
            Ok(())
        })
    }

    async fn set_rounded_final_weight(
        &self,
        analysis_id: &str,
        value: f64,
    ) -> Result<PmsAnalysis, StoreError> {
        self.with_record(analysis_id, |record| {
            record.ensure_unlocked()?;
            if !value.is_finite() || value <= 0.0 {
                return Err(StoreError::Rejected(format!(
                    "rounded final weight must be positive, got {value}"
                )));
            }
            record.analysis.rounded_final_weight = Some(value);
            Ok(record.analysis.clone())
        })
    }

    async fn finalize_analysis(&self, analysis_id: &str) -> Result<PmsAnalysis, StoreError> {
        let limits = self.limits;
        self.with_record(analysis_id, |record| {
            if let Some(reason) =
                policy::finalize_blocker(&record.analysis, &record.repetitions, &limits)
            {
                return Err(StoreError::Rejected(reason.to_string()));
            }
            record.analysis.state = AnalysisState::PendingApproval;
            Ok(record.analysis.clone())
        })
    }

    async fn approve_analysis(&self, analysis_id: &str) -> Result<PmsAnalysis, StoreError> {
        self.with_record(analysis_id, |record| {
            match record.analysis.state {
                AnalysisState::PendingApproval | AnalysisState::Finalized => {
                    record.analysis.state = AnalysisState::Approved;
                    Ok(record.analysis.clone())
                }
                state => Err(StoreError::Rejected(format!(
                    "cannot approve an analysis in state {state}"
                ))),
            }
        })
    }

    async fn mark_for_repeat(&self, analysis_id: &str) -> Result<PmsAnalysis, StoreError> {
        self.with_record(analysis_id, |record| {
            if record.analysis.state == AnalysisState::Registered {
                return Err(StoreError::Rejected(
                    "nothing to repeat on a registered analysis".into(),
                ));
            }
            record.analysis.state = AnalysisState::ForRepeat;
            Ok(record.analysis.clone())
        })
    }
}

/// One-line summary of a repetition, for log lines.
pub fn describe(rep: &Repetition) -> String {
    format!(
        "tanda {} rep {} ({} g) {}",
        rep.tanda_number, rep.rep_number, rep.weight, rep.valid
    )
}
