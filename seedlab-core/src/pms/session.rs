//! Guarded mutations over a confirmed snapshot
//!
//! A [`PmsSession`] keeps the last snapshot confirmed by the store. Every
//! mutation is checked locally first (rejections never reach the store), then
//! sent to the store, and on success the whole snapshot is fetched again.
//! When the store call or the reload fails the previous snapshot stays in
//! place and the error is returned as-is; nothing is retried.

use super::errors::PmsError;
use super::policy;
use super::snapshot::{PmsSnapshot, PolicyFlags};
use super::store::{describe, StoreHandle};
use super::types::{Repetition, RepetitionDraft, RepetitionUpdate};
use crate::config::PolicyLimits;

pub struct PmsSession {
    store: StoreHandle,
    analysis_id: String,
    limits: PolicyLimits,
    snapshot: PmsSnapshot,
}

/// Parse user-entered text as a rounded final weight.
pub fn parse_rounded_weight(input: &str) -> Result<f64, PmsError> {
    let value: f64 = input
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| PmsError::InvalidInput(format!("'{}' is not a number", input.trim())))?;
    check_rounded_weight(value)?;
    Ok(value)
}

fn check_rounded_weight(value: f64) -> Result<(), PmsError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PmsError::InvalidInput(format!(
            "rounded final weight must be greater than zero, got {value}"
        )));
    }
    Ok(())
}

fn check_repetition_weight(weight: f64) -> Result<(), PmsError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(PmsError::InvalidInput(format!(
            "repetition weight must be a non-negative number, got {weight}"
        )));
    }
    Ok(())
}

async fn fetch_snapshot(store: &StoreHandle, analysis_id: &str) -> Result<PmsSnapshot, PmsError> {
    let analysis = store.fetch_analysis(analysis_id).await?;
    let repetitions = store.fetch_repetitions(analysis_id).await?;
    let snapshot = PmsSnapshot::new(analysis, repetitions);
    snapshot.validate()?;
    Ok(snapshot)
}

impl PmsSession {
    pub async fn load(
        store: StoreHandle,
        analysis_id: impl Into<String>,
        limits: PolicyLimits,
    ) -> Result<Self, PmsError> {
        let analysis_id = analysis_id.into();
        let snapshot = fetch_snapshot(&store, &analysis_id).await?;
        log::debug!(
            "Loaded analysis {analysis_id}: {} repetition(s) over {} tanda(s)",
            snapshot.total(),
            snapshot.analysis.tanda_count
        );
        Ok(Self {
            store,
            analysis_id,
            limits,
            snapshot,
        })
    }

    pub fn snapshot(&self) -> &PmsSnapshot {
        &self.snapshot
    }

    pub fn limits(&self) -> &PolicyLimits {
        &self.limits
    }

    pub fn flags(&self) -> PolicyFlags {
        self.snapshot.flags(&self.limits)
    }

    /// Replace the snapshot with a fresh one from the store.
    pub async fn reload(&mut self) -> Result<(), PmsError> {
        self.snapshot = fetch_snapshot(&self.store, &self.analysis_id).await?;
        Ok(())
    }

    fn ensure_unlocked(&self) -> Result<(), PmsError> {
        let state = self.snapshot.analysis.state;
        if state.is_locked() {
            return Err(PmsError::Locked(state));
        }
        Ok(())
    }

    /// Record a new repetition in the current tanda.
    ///
    /// Returns the repetition as found in the reloaded snapshot, carrying the
    /// store's classification.
    pub async fn add_repetition(&mut self, weight: f64) -> Result<Repetition, PmsError> {
        self.ensure_unlocked()?;
        check_repetition_weight(weight)?;

        let decision = self.snapshot.evaluate_add(&self.limits);
        if !decision.allows() {
            log::debug!("Add rejected for {}: {decision}", self.analysis_id);
            return Err(PmsError::AddRefused(decision));
        }

        let draft = RepetitionDraft {
            tanda_number: self.snapshot.current_tanda(),
            rep_number: self.snapshot.next_repetition_number(),
            weight,
        };
        let created = self.store.create_repetition(&self.analysis_id, draft).await?;
        self.reload().await?;

        let confirmed = created
            .id
            .as_deref()
            .and_then(|id| self.snapshot.find(id))
            .cloned()
            .unwrap_or(created);
        log::info!("Analysis {}: added {}", self.analysis_id, describe(&confirmed));
        Ok(confirmed)
    }

    /// Change the weight of an existing repetition; numbering is kept.
    pub async fn update_repetition(
        &mut self,
        repetition_id: &str,
        weight: f64,
    ) -> Result<Repetition, PmsError> {
        self.ensure_unlocked()?;
        check_repetition_weight(weight)?;

        let existing = self
            .snapshot
            .find(repetition_id)
            .ok_or_else(|| PmsError::RepetitionNotFound(repetition_id.to_string()))?;
        let update = RepetitionUpdate {
            tanda_number: existing.tanda_number,
            rep_number: existing.rep_number,
            weight,
            valid: existing.valid,
        };

        let updated = self
            .store
            .update_repetition(&self.analysis_id, repetition_id, update)
            .await?;
        self.reload().await?;

        let confirmed = self.snapshot.find(repetition_id).cloned().unwrap_or(updated);
        log::info!("Analysis {}: updated {}", self.analysis_id, describe(&confirmed));
        Ok(confirmed)
    }

    /// Remove a repetition. Remaining repetitions are not renumbered.
    pub async fn delete_repetition(&mut self, repetition_id: &str) -> Result<(), PmsError> {
        self.ensure_unlocked()?;
        if self.snapshot.find(repetition_id).is_none() {
            return Err(PmsError::RepetitionNotFound(repetition_id.to_string()));
        }

        self.store
            .delete_repetition(&self.analysis_id, repetition_id)
            .await?;
        self.reload().await?;
        log::info!("Analysis {}: deleted repetition {repetition_id}", self.analysis_id);
        Ok(())
    }

    pub async fn set_rounded_weight(&mut self, value: f64) -> Result<(), PmsError> {
        check_rounded_weight(value)?;
        self.ensure_unlocked()?;
        if let Some(reason) = policy::rounded_weight_blocker(
            &self.snapshot.analysis,
            &self.snapshot.repetitions,
            &self.limits,
        ) {
            return Err(PmsError::NotPermitted(reason));
        }

        self.store
            .set_rounded_final_weight(&self.analysis_id, value)
            .await?;
        self.reload().await
    }

    pub async fn finalize(&mut self) -> Result<(), PmsError> {
        if let Some(reason) = policy::finalize_blocker(
            &self.snapshot.analysis,
            &self.snapshot.repetitions,
            &self.limits,
        ) {
            return Err(PmsError::NotPermitted(reason));
        }

        self.store.finalize_analysis(&self.analysis_id).await?;
        self.reload().await?;
        log::info!(
            "Analysis {} finalized, now {}",
            self.analysis_id,
            self.snapshot.analysis.state
        );
        Ok(())
    }

    pub async fn approve(&mut self) -> Result<(), PmsError> {
        self.store.approve_analysis(&self.analysis_id).await?;
        self.reload().await
    }

    pub async fn mark_for_repeat(&mut self) -> Result<(), PmsError> {
        self.store.mark_for_repeat(&self.analysis_id).await?;
        self.reload().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pms::policy::AddDecision;
    use crate::pms::store::{MemoryStore, PmsStore, StoreError};
    use crate::pms::types::{AnalysisState, PmsAnalysis, Validity};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Wraps a store, counting mutations and failing them on demand.
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
        mutations: AtomicUsize,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                failing: AtomicBool::new(false),
                mutations: AtomicUsize::new(0),
            }
        }

        fn begin(&self) -> Result<(), StoreError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PmsStore for FlakyStore {
        async fn fetch_analysis(&self, id: &str) -> Result<PmsAnalysis, StoreError> {
            self.inner.fetch_analysis(id).await
        }
        async fn fetch_repetitions(&self, id: &str) -> Result<Vec<Repetition>, StoreError> {
            self.inner.fetch_repetitions(id).await
        }
        async fn create_repetition(
            &self,
            id: &str,
            draft: RepetitionDraft,
        ) -> Result<Repetition, StoreError> {
            self.begin()?;
            self.inner.create_repetition(id, draft).await
        }
        async fn update_repetition(
            &self,
            id: &str,
            rep_id: &str,
            update: RepetitionUpdate,
        ) -> Result<Repetition, StoreError> {
            self.begin()?;
            self.inner.update_repetition(id, rep_id, update).await
        }
        async fn delete_repetition(&self, id: &str, rep_id: &str) -> Result<(), StoreError> {
            self.begin()?;
            self.inner.delete_repetition(id, rep_id).await
        }
        async fn set_rounded_final_weight(
            &self,
            id: &str,
            value: f64,
        ) -> Result<PmsAnalysis, StoreError> {
            self.begin()?;
            self.inner.set_rounded_final_weight(id, value).await
        }
        async fn finalize_analysis(&self, id: &str) -> Result<PmsAnalysis, StoreError> {
            self.begin()?;
            self.inner.finalize_analysis(id).await
        }
        async fn approve_analysis(&self, id: &str) -> Result<PmsAnalysis, StoreError> {
            self.begin()?;
            self.inner.approve_analysis(id).await
        }
        async fn mark_for_repeat(&self, id: &str) -> Result<PmsAnalysis, StoreError> {
            self.begin()?;
            self.inner.mark_for_repeat(id).await
        }
    }

    fn flaky(expected: u32, coarse: bool, limits: PolicyLimits) -> Arc<FlakyStore> {
        let inner = MemoryStore::new(limits);
        inner
            .insert_analysis(PmsAnalysis::new("pms-1", expected, coarse), Vec::new())
            .unwrap();
        Arc::new(FlakyStore::new(inner))
    }

    async fn session_over(store: &Arc<FlakyStore>, limits: PolicyLimits) -> PmsSession {
        let handle: StoreHandle = store.clone();
        PmsSession::load(handle, "pms-1", limits).await.unwrap()
    }

    #[test]
    fn test_parse_rounded_weight() {
        assert_eq!(parse_rounded_weight(" 20.4 ").unwrap(), 20.4);
        assert_eq!(parse_rounded_weight("20,4").unwrap(), 20.4);
        assert!(matches!(
            parse_rounded_weight("abc"),
            Err(PmsError::InvalidInput(_))
        ));
        assert!(parse_rounded_weight("0").is_err());
        assert!(parse_rounded_weight("-3.1").is_err());
        assert!(parse_rounded_weight("NaN").is_err());
        assert!(parse_rounded_weight("").is_err());
    }

    #[tokio::test]
    async fn test_add_assigns_tanda_and_number() {
        let limits = PolicyLimits::default();
        let store = flaky(3, false, limits);
        let mut session = session_over(&store, limits).await;

        let first = session.add_repetition(20.0).await.unwrap();
        assert_eq!((first.tanda_number, first.rep_number), (1, 1));
        assert_eq!(first.valid, Validity::Indeterminate);

        session.add_repetition(20.1).await.unwrap();
        let third = session.add_repetition(19.9).await.unwrap();
        assert_eq!(third.rep_number, 3);
        assert_eq!(third.valid, Validity::Valid);

        let flags = session.flags();
        assert!(!flags.can_add_repetition);
        assert!(flags.can_edit_rounded_weight);
        assert!(!flags.can_finalize);

        // stop condition is enforced locally
        let before = store.mutations.load(Ordering::SeqCst);
        assert!(matches!(
            session.add_repetition(20.0).await,
            Err(PmsError::AddRefused(AddDecision::Converged { .. }))
        ));
        assert_eq!(store.mutations.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_invalid_weights_never_reach_store() {
        let limits = PolicyLimits::default();
        let store = flaky(3, false, limits);
        let mut session = session_over(&store, limits).await;

        assert!(matches!(
            session.add_repetition(-1.0).await,
            Err(PmsError::InvalidInput(_))
        ));
        assert!(session.add_repetition(f64::INFINITY).await.is_err());
        assert!(matches!(
            session.set_rounded_weight(0.0).await,
            Err(PmsError::InvalidInput(_))
        ));
        assert_eq!(store.mutations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_snapshot() {
        let limits = PolicyLimits::default();
        let store = flaky(3, false, limits);
        let mut session = session_over(&store, limits).await;
        session.add_repetition(20.0).await.unwrap();
        let before = session.snapshot().clone();

        store.failing.store(true, Ordering::SeqCst);
        let result = session.add_repetition(20.1).await;
        assert!(matches!(
            result,
            Err(PmsError::Store(StoreError::Unavailable(_)))
        ));
        assert_eq!(session.snapshot(), &before);

        // no automatic retry: the failing call was attempted once
        assert_eq!(store.mutations.load(Ordering::SeqCst), 2);

        store.failing.store(false, Ordering::SeqCst);
        session.add_repetition(20.1).await.unwrap();
        assert_eq!(session.snapshot().total(), 2);
    }

    #[tokio::test]
    async fn test_rounded_weight_requires_enough_valid_data() {
        let limits = PolicyLimits::default();
        let store = flaky(3, false, limits);
        let mut session = session_over(&store, limits).await;
        session.add_repetition(20.0).await.unwrap();

        assert!(matches!(
            session.set_rounded_weight(20.0).await,
            Err(PmsError::NotPermitted(_))
        ));

        session.add_repetition(20.1).await.unwrap();
        session.add_repetition(19.9).await.unwrap();
        session.set_rounded_weight(20.0).await.unwrap();
        assert_eq!(session.snapshot().analysis.rounded_final_weight, Some(20.0));
    }

    #[tokio::test]
    async fn test_finalize_approve_and_repeat() {
        let limits = PolicyLimits::default();
        let store = flaky(3, false, limits);
        let mut session = session_over(&store, limits).await;

        assert!(matches!(
            session.finalize().await,
            Err(PmsError::NotPermitted("no repetitions recorded"))
        ));

        for w in [20.0, 20.1, 19.9] {
            session.add_repetition(w).await.unwrap();
        }
        session.set_rounded_weight(20.0).await.unwrap();
        session.finalize().await.unwrap();
        assert_eq!(session.snapshot().analysis.state, AnalysisState::PendingApproval);

        assert!(matches!(
            session.add_repetition(20.0).await,
            Err(PmsError::Locked(AnalysisState::PendingApproval))
        ));
        assert!(matches!(
            session.set_rounded_weight(21.0).await,
            Err(PmsError::Locked(_))
        ));

        session.approve().await.unwrap();
        assert_eq!(session.snapshot().analysis.state, AnalysisState::Approved);

        session.mark_for_repeat().await.unwrap();
        assert_eq!(session.snapshot().analysis.state, AnalysisState::ForRepeat);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let limits = PolicyLimits::default();
        let store = flaky(4, false, limits);
        let mut session = session_over(&store, limits).await;

        let mut ids = Vec::new();
        for w in [20.0, 20.1, 19.9] {
            let rep = session.add_repetition(w).await.unwrap();
            ids.push(rep.id.unwrap());
        }

        let updated = session.update_repetition(&ids[0], 20.2).await.unwrap();
        assert_eq!(updated.weight, 20.2);
        assert_eq!(updated.rep_number, 1);

        session.delete_repetition(&ids[1]).await.unwrap();
        let numbers: Vec<u32> = session
            .snapshot()
            .repetitions
            .iter()
            .map(|r| r.rep_number)
            .collect();
        assert_eq!(numbers, vec![1, 3]);

        assert!(matches!(
            session.delete_repetition(&ids[1]).await,
            Err(PmsError::RepetitionNotFound(_))
        ));
        assert!(matches!(
            session.update_repetition("missing", 20.0).await,
            Err(PmsError::RepetitionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_after_delete_keeps_numbers_unique() {
        let limits = PolicyLimits::default();
        let store = flaky(4, false, limits);
        let mut session = session_over(&store, limits).await;

        let mut ids = Vec::new();
        for w in [20.0, 20.1, 19.9] {
            ids.push(session.add_repetition(w).await.unwrap().id.unwrap());
        }
        session.delete_repetition(&ids[0]).await.unwrap();
        assert_eq!(session.flags().next_repetition_number, 3);

        let added = session.add_repetition(20.0).await.unwrap();
        assert_eq!((added.tanda_number, added.rep_number), (1, 4));

        let mut numbers: Vec<u32> = session
            .snapshot()
            .repetitions
            .iter()
            .filter(|r| r.tanda_number == 1)
            .map(|r| r.rep_number)
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_bad_batch_opens_second_tanda() {
        let limits = PolicyLimits::default();
        let store = flaky(4, false, limits);
        let mut session = session_over(&store, limits).await;

        for w in [20.0, 20.0, 20.0, 30.0] {
            session.add_repetition(w).await.unwrap();
        }
        let flags = session.flags();
        assert_eq!(session.snapshot().analysis.tanda_count, 2);
        assert_eq!(flags.current_tanda, 2);
        assert_eq!(flags.next_repetition_number, 1);
        assert!(flags.can_add_repetition);

        for w in [20.0, 20.0, 20.0] {
            let rep = session.add_repetition(w).await.unwrap();
            assert_eq!(rep.tanda_number, 2);
            assert_eq!(rep.valid, Validity::Indeterminate);
        }
        session.add_repetition(20.0).await.unwrap();

        // pooled over eight, the 30 g repetition is now an outlier
        let counts = session.snapshot().counts();
        assert_eq!(counts.invalid, 1);
        assert_eq!(counts.valid, 7);

        let flags = session.flags();
        assert!(!flags.can_add_repetition);
        assert_eq!(flags.current_tanda, 1);
        assert!(flags.can_edit_rounded_weight);

        let groups = session.snapshot().grouped_by_tanda();
        assert!(!groups[0].complete);
        assert!(groups[1].complete);
    }

    #[tokio::test]
    async fn test_ceiling_stops_session() {
        let limits = PolicyLimits {
            max_repetitions: 5,
            ..PolicyLimits::default()
        };
        let store = flaky(4, false, limits);
        let mut session = session_over(&store, limits).await;

        for w in [10.0, 20.0, 30.0, 40.0, 25.0] {
            session.add_repetition(w).await.unwrap();
        }
        assert!(matches!(
            session.add_repetition(25.0).await,
            Err(PmsError::AddRefused(AddDecision::CeilingReached { total: 5 }))
        ));

        // wide spread, but the ceiling lets the analysis close
        session.set_rounded_weight(25.0).await.unwrap();
        assert!(session.flags().can_finalize);
        session.finalize().await.unwrap();
    }
}
