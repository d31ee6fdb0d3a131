//! Transport-independent API layer.
//!
//! `VeritextApi` is the single entry point for all consumer-facing
//! operations. Transports (CLI, HTTP, direct embedding) call these
//! methods — they never reach into the orchestrator, store, or engine
//! directly. Every operation resolves the caller's principal first; an
//! unresolvable principal short-circuits with `AuthorizationRequired`
//! before any work happens.

use std::sync::Arc;

use crate::analysis::{AnalysisError, AnalysisOrchestrator, AnalysisReport, AnalysisRequest};
use crate::engine::AnalysisEngine;
use crate::history::{AnalysisRecord, HistoryStore, MatchedSource, RecordId, RecordPage};
use crate::identity::{Identity, IdentityResolver};
use crate::stats::{StatisticsAggregator, SystemStatistics, UserStatistics};

/// Single entry point for all consumer-facing operations.
pub struct VeritextApi {
    orchestrator: AnalysisOrchestrator,
    store: Arc<dyn HistoryStore>,
    resolver: Arc<dyn IdentityResolver>,
    stats: StatisticsAggregator,
}

impl VeritextApi {
    pub fn new(
        engine: Arc<dyn AnalysisEngine>,
        store: Arc<dyn HistoryStore>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            orchestrator: AnalysisOrchestrator::new(engine, store.clone()),
            stats: StatisticsAggregator::new(store.clone()),
            store,
            resolver,
        }
    }

    fn identity(&self, principal: &str) -> Result<Identity, AnalysisError> {
        self.resolver
            .resolve(principal)
            .map_err(AnalysisError::Persistence)?
            .ok_or(AnalysisError::AuthorizationRequired)
    }

    // --- Analysis ---

    /// Run one analysis attempt on behalf of the principal.
    pub async fn analyze(
        &self,
        principal: &str,
        request: AnalysisRequest,
    ) -> Result<AnalysisReport, AnalysisError> {
        let identity = self.identity(principal)?;
        self.orchestrator.analyze(&identity, &request).await
    }

    // --- History reads ---

    /// Paginated history for the principal, newest first.
    pub fn history(
        &self,
        principal: &str,
        page: u32,
        size: u32,
    ) -> Result<RecordPage, AnalysisError> {
        let identity = self.identity(principal)?;
        self.store
            .records_page(&identity.id, page, size)
            .map_err(AnalysisError::Persistence)
    }

    /// Most recent records for the principal.
    pub fn recent(&self, principal: &str, limit: u32) -> Result<Vec<AnalysisRecord>, AnalysisError> {
        let identity = self.identity(principal)?;
        self.store
            .recent_records(&identity.id, limit)
            .map_err(AnalysisError::Persistence)
    }

    /// Matched sources for one of the principal's records.
    ///
    /// A record owned by another identity is reported as not found rather
    /// than leaking its existence.
    pub fn record_sources(
        &self,
        principal: &str,
        record_id: &RecordId,
    ) -> Result<Vec<MatchedSource>, AnalysisError> {
        let identity = self.identity(principal)?;
        let record = self
            .store
            .get_record(record_id)
            .map_err(AnalysisError::Persistence)?
            .ok_or(AnalysisError::RecordNotFound)?;

        if record.identity_id != identity.id {
            return Err(AnalysisError::RecordNotFound);
        }

        self.store
            .sources_for_record(record_id)
            .map_err(AnalysisError::Persistence)
    }

    // --- Statistics ---

    pub fn user_statistics(&self, principal: &str) -> Result<UserStatistics, AnalysisError> {
        let identity = self.identity(principal)?;
        self.stats
            .user_statistics(&identity.id)
            .map_err(AnalysisError::Persistence)
    }

    /// System-wide source-reuse statistics. Still requires an
    /// authenticated principal, but the figures span all identities.
    pub fn system_statistics(&self, principal: &str) -> Result<SystemStatistics, AnalysisError> {
        self.identity(principal)?;
        self.stats
            .system_statistics()
            .map_err(AnalysisError::Persistence)
    }

    // --- Retention ---

    /// Delete records older than `days_to_keep` days, returning the count
    /// removed. Matched sources cascade with their records.
    pub fn cleanup(&self, days_to_keep: u32) -> Result<u64, AnalysisError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days_to_keep as i64);
        self.store
            .delete_records_older_than(cutoff)
            .map_err(AnalysisError::Persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{mock_payload, MockEngine};
    use crate::history::{OpenHistory, SqliteHistory};
    use crate::identity::StaticResolver;

    fn api_with(engine: MockEngine) -> (VeritextApi, Arc<SqliteHistory>, Identity) {
        let store = Arc::new(SqliteHistory::open_in_memory().unwrap());
        let identity = Identity::new("alice");
        store.insert_identity(&identity).unwrap();
        let resolver = Arc::new(StaticResolver::new().with_identity(identity.clone()));
        let api = VeritextApi::new(Arc::new(engine), store.clone(), resolver);
        (api, store, identity)
    }

    #[tokio::test]
    async fn unknown_principal_is_rejected_before_any_record() {
        let (api, store, identity) = api_with(MockEngine::new());

        let err = api
            .analyze("mallory", AnalysisRequest::new("text"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::AuthorizationRequired));
        assert_eq!(store.count_records(&identity.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn sources_of_foreign_record_read_as_not_found() {
        let (api, store, _alice) =
            api_with(MockEngine::new().with_payload(mock_payload(10.0, false, 5.0)));

        // bob owns a record; alice must not see it
        let bob = Identity::new("bob");
        store.insert_identity(&bob).unwrap();
        let record = crate::history::AnalysisRecord::processing(bob.id.clone(), "bob's text");
        store.insert_record(&record).unwrap();

        let err = api.record_sources("alice", &record.id).unwrap_err();
        assert!(matches!(err, AnalysisError::RecordNotFound));
    }

    #[tokio::test]
    async fn analyze_then_read_back_through_the_api() {
        let (api, _store, _identity) =
            api_with(MockEngine::new().with_payload(mock_payload(42.0, true, 80.0)));

        let report = api
            .analyze("alice", AnalysisRequest::new("essay text"))
            .await
            .unwrap();

        let page = api.history("alice", 0, 10).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].id, report.record_id);

        let recent = api.recent("alice", 5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, report.record_id);

        let sources = api.record_sources("alice", &report.record_id).unwrap();
        assert!(sources.is_empty());

        let stats = api.user_statistics("alice").unwrap();
        assert_eq!(stats.total_searches, 1);
    }
}
