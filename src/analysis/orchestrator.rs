//! Analysis orchestrator — the state machine turning one request into an
//! engine invocation, a translated result, and a terminal history record.
//!
//! The record is persisted in PROCESSING state before the engine runs, so
//! even a crash mid-call leaves an auditable record. Every exit path —
//! engine failure, translation failure, source-row persistence failure —
//! finalizes the record as COMPLETED or FAILED before returning; no path
//! leaves it PROCESSING.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::types::{AnalysisError, AnalysisReport, AnalysisRequest};
use crate::engine::translate::{translate, EngineReport};
use crate::engine::{AnalysisEngine, EngineRequest};
use crate::history::{AnalysisRecord, HistoryStore, MatchedSource};
use crate::identity::Identity;

/// Orchestrates analysis attempts against the engine and history store.
///
/// Holds no per-request state; one instance serves concurrent requests.
pub struct AnalysisOrchestrator {
    engine: Arc<dyn AnalysisEngine>,
    store: Arc<dyn HistoryStore>,
}

impl AnalysisOrchestrator {
    pub fn new(engine: Arc<dyn AnalysisEngine>, store: Arc<dyn HistoryStore>) -> Self {
        Self { engine, store }
    }

    /// Run one analysis attempt for a resolved identity.
    ///
    /// Exactly one record is persisted per call, and it is terminal
    /// (COMPLETED or FAILED) by the time this returns. No automatic
    /// retries: a failed attempt requires a fresh request.
    pub async fn analyze(
        &self,
        identity: &Identity,
        request: &AnalysisRequest,
    ) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();

        let mut record = AnalysisRecord::processing(identity.id.clone(), &request.text);
        self.store
            .insert_record(&record)
            .map_err(AnalysisError::Persistence)?;

        info!(
            record_id = %record.id,
            user = %identity.username,
            text_length = record.text_length,
            engine = self.engine.id(),
            "analysis started"
        );

        let outcome = self.run_attempt(&record, request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(report) => self.finalize_completed(record, report, elapsed_ms),
            Err(error) => Err(self.finalize_failed(record, error, elapsed_ms)),
        }
    }

    /// The fallible middle of the pipeline: invoke, translate, persist
    /// source rows. Record finalization happens in the caller on both
    /// arms.
    async fn run_attempt(
        &self,
        record: &AnalysisRecord,
        request: &AnalysisRequest,
    ) -> Result<EngineReport, AnalysisError> {
        let engine_request =
            EngineRequest::new(request.text.clone()).with_paraphrasing(request.check_paraphrasing);

        let output = self.engine.invoke(&engine_request).await.map_err(|e| {
            debug!(record_id = %record.id, "engine invocation failed: {e}");
            AnalysisError::from_engine(&e)
        })?;

        let report = translate(&output).map_err(|e| {
            debug!(record_id = %record.id, "payload translation failed: {e}");
            AnalysisError::from_translate(&e)
        })?;

        for matched in &report.matched_sources {
            let row = MatchedSource::from_match(&record.id, matched);
            self.store
                .insert_source(&row)
                .map_err(AnalysisError::Persistence)?;
        }

        Ok(report)
    }

    fn finalize_completed(
        &self,
        mut record: AnalysisRecord,
        report: EngineReport,
        elapsed_ms: u64,
    ) -> Result<AnalysisReport, AnalysisError> {
        record.mark_completed(&report, elapsed_ms);
        if let Err(e) = self.store.update_record(&record) {
            // completion could not be persisted, so the attempt cannot be
            // reported COMPLETED; demote to a failed attempt
            return Err(self.finalize_failed(record, AnalysisError::Persistence(e), elapsed_ms));
        }

        info!(
            record_id = %record.id,
            similarity_score = report.similarity_score,
            sources_found = report.matched_sources.len(),
            elapsed_ms,
            "analysis completed"
        );

        Ok(AnalysisReport::from_engine_report(
            record.id,
            report,
            elapsed_ms,
        ))
    }

    /// Finalize a failed attempt: no source rows are retained, the record
    /// carries the user-safe summary, and the typed error is handed back.
    fn finalize_failed(
        &self,
        mut record: AnalysisRecord,
        error: AnalysisError,
        elapsed_ms: u64,
    ) -> AnalysisError {
        warn!(record_id = %record.id, elapsed_ms, "analysis failed: {error}");

        // Best-effort cleanup of any rows written before the failure, so a
        // FAILED record never carries a partial source set.
        if let Err(e) = self.store.delete_sources_for_record(&record.id) {
            warn!(record_id = %record.id, "source cleanup failed: {e}");
        }

        record.mark_failed(error.to_string(), elapsed_ms);
        if let Err(e) = self.store.update_record(&record) {
            warn!(record_id = %record.id, "could not finalize failed record: {e}");
        }

        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{mock_payload, EngineError, MockEngine};
    use crate::history::{OpenHistory, RecordStatus, SqliteHistory};
    use serde_json::json;

    fn fixture(engine: MockEngine) -> (AnalysisOrchestrator, Arc<SqliteHistory>, Identity) {
        let store = Arc::new(SqliteHistory::open_in_memory().unwrap());
        let identity = Identity::new("alice");
        store.insert_identity(&identity).unwrap();
        let orchestrator = AnalysisOrchestrator::new(Arc::new(engine), store.clone());
        (orchestrator, store, identity)
    }

    #[tokio::test]
    async fn successful_attempt_completes_the_record() {
        let payload = json!({
            "similarityScore": 55.0,
            "aiDetected": true,
            "aiConfidence": 0.9,
            "matchedSources": [{
                "url": "https://example.com/page",
                "title": "Example",
                "similarityPercentage": 55.0,
                "matchedText": "copied text",
            }],
        });
        let (orchestrator, store, identity) = fixture(MockEngine::new().with_payload(payload));

        let report = orchestrator
            .analyze(&identity, &AnalysisRequest::new("the text"))
            .await
            .unwrap();

        assert_eq!(report.similarity_score, 55.0);
        assert_eq!(report.ai_confidence, 90.0);
        assert_eq!(report.matched_sources.len(), 1);

        let record = store.get_record(&report.record_id).unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.similarity_score, Some(55.0));
        assert_eq!(record.ai_detected, Some(true));
        assert_eq!(record.sources_found, 1);
        assert!(record.processing_time_ms.is_some());
        assert_eq!(record.error_message, None);
        assert_eq!(store.count_sources(&record.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn engine_failure_finalizes_a_failed_record() {
        let (orchestrator, store, identity) =
            fixture(MockEngine::new().with_failure(EngineError::Timeout(60)));

        let err = orchestrator
            .analyze(&identity, &AnalysisRequest::new("text"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EngineTimeout));

        let failed = store
            .records_with_status(&identity.id, RecordStatus::Failed)
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(
            failed[0].error_message.as_deref(),
            Some("analysis engine timed out")
        );
        assert!(failed[0].processing_time_ms.is_some());
        assert_eq!(store.count_sources(&failed[0].id).unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_typed_payload_fails_without_completing() {
        let (orchestrator, store, identity) =
            fixture(MockEngine::new().with_payload(json!({"similarityScore": "high"})));

        let err = orchestrator
            .analyze(&identity, &AnalysisRequest::new("text"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EngineMalformedOutput));

        let records = store.recent_records(&identity.id, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Failed);
        assert_eq!(records[0].similarity_score, None);
    }

    #[tokio::test]
    async fn engine_reported_error_fails_the_attempt() {
        let (orchestrator, store, identity) =
            fixture(MockEngine::new().with_payload(json!({"error": "quota exceeded"})));

        let err = orchestrator
            .analyze(&identity, &AnalysisRequest::new("text"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EngineReported(_)));

        let records = store.recent_records(&identity.id, 10).unwrap();
        assert_eq!(records[0].status, RecordStatus::Failed);
        assert_eq!(
            records[0].error_message.as_deref(),
            Some("analysis engine reported an error: quota exceeded")
        );
    }

    #[tokio::test]
    async fn malformed_source_entry_leaves_no_partial_rows() {
        // first entry valid, second malformed: translation fails as a whole
        let payload = json!({
            "similarityScore": 10.0,
            "matchedSources": [
                {
                    "url": "https://example.com/ok",
                    "title": "Ok",
                    "similarityPercentage": 10.0,
                    "matchedText": "x",
                },
                { "url": "https://example.com/bad" },
            ],
        });
        let (orchestrator, store, identity) = fixture(MockEngine::new().with_payload(payload));

        let err = orchestrator
            .analyze(&identity, &AnalysisRequest::new("text"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EngineMalformedOutput));

        let records = store.recent_records(&identity.id, 10).unwrap();
        assert_eq!(records[0].status, RecordStatus::Failed);
        assert_eq!(store.count_sources(&records[0].id).unwrap(), 0);
    }

    #[tokio::test]
    async fn every_attempt_persists_exactly_one_record() {
        let (orchestrator, store, identity) = fixture(
            MockEngine::new()
                .with_payload(mock_payload(10.0, false, 5.0))
                .with_failure(EngineError::Spawn("missing".to_string())),
        );

        let _ = orchestrator
            .analyze(&identity, &AnalysisRequest::new("first"))
            .await;
        let _ = orchestrator
            .analyze(&identity, &AnalysisRequest::new("second"))
            .await;

        assert_eq!(store.count_records(&identity.id).unwrap(), 2);
        for record in store.recent_records(&identity.id, 10).unwrap() {
            assert!(record.is_terminal());
        }
    }

    #[tokio::test]
    async fn empty_text_is_forwarded_to_the_engine() {
        let (orchestrator, store, identity) =
            fixture(MockEngine::new().with_payload(mock_payload(0.0, false, 0.0)));

        let report = orchestrator
            .analyze(&identity, &AnalysisRequest::new(""))
            .await
            .unwrap();

        let record = store.get_record(&report.record_id).unwrap().unwrap();
        assert_eq!(record.text_length, 0);
        assert_eq!(record.status, RecordStatus::Completed);
    }
}
