//! Persisted value records: one `AnalysisRecord` per analysis attempt,
//! zero or more `MatchedSource` rows per completed record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::translate::{EngineReport, SourceMatch};
use crate::identity::IdentityId;

/// Unique identifier for an analysis record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a matched-source row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of an analysis record.
///
/// PENDING is transient (pre-persistence); persisted records start at
/// PROCESSING and transition exactly once to COMPLETED or FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RecordStatus {
    /// Stable string form used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "PENDING",
            RecordStatus::Processing => "PROCESSING",
            RecordStatus::Completed => "COMPLETED",
            RecordStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RecordStatus::Pending),
            "PROCESSING" => Some(RecordStatus::Processing),
            "COMPLETED" => Some(RecordStatus::Completed),
            "FAILED" => Some(RecordStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Completed | RecordStatus::Failed)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted analysis attempt.
///
/// Score fields stay `None` until the attempt completes; `error_message`
/// is set only on FAILED. `created_at` is set once at construction and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: RecordId,
    pub identity_id: IdentityId,
    /// The submitted text, stored verbatim for duplicate/frequency analysis.
    pub search_query: String,
    pub text_length: u32,
    pub similarity_score: Option<f64>,
    pub ai_detected: Option<bool>,
    /// AI-detection confidence on the 0–100 scale.
    pub ai_confidence: Option<f64>,
    pub sources_found: u32,
    /// Wall-clock duration of the full orchestration; set on both
    /// terminal outcomes.
    pub processing_time_ms: Option<u64>,
    pub status: RecordStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Construct a record in PROCESSING state for a fresh attempt.
    pub fn processing(identity_id: IdentityId, text: &str) -> Self {
        Self {
            id: RecordId::new(),
            identity_id,
            search_query: text.to_string(),
            text_length: text.len() as u32,
            similarity_score: None,
            ai_detected: None,
            ai_confidence: None,
            sources_found: 0,
            processing_time_ms: None,
            status: RecordStatus::Processing,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// Transition to COMPLETED, populating all score fields from the
    /// translated engine report.
    pub fn mark_completed(&mut self, report: &EngineReport, elapsed_ms: u64) {
        self.similarity_score = Some(report.similarity_score);
        self.ai_detected = Some(report.ai_detected);
        self.ai_confidence = Some(report.ai_confidence);
        self.sources_found = report.matched_sources.len() as u32;
        self.processing_time_ms = Some(elapsed_ms);
        self.status = RecordStatus::Completed;
        self.error_message = None;
    }

    /// Transition to FAILED with a user-safe error summary.
    ///
    /// Score fields are cleared: a failed attempt carries an error
    /// message and nothing else.
    pub fn mark_failed(&mut self, message: impl Into<String>, elapsed_ms: u64) {
        self.status = RecordStatus::Failed;
        self.error_message = Some(message.into());
        self.processing_time_ms = Some(elapsed_ms);
        self.similarity_score = None;
        self.ai_detected = None;
        self.ai_confidence = None;
        self.sources_found = 0;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One detected similar external document, owned by its parent record.
///
/// Created only as part of a successful orchestration; never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedSource {
    pub id: SourceId,
    pub record_id: RecordId,
    pub url: String,
    pub title: String,
    /// Similarity of the matched document, 0–100.
    pub similarity_percentage: f64,
    pub matched_text: String,
    /// Host portion of the url, or `"unknown"` when unparsable.
    pub domain: String,
    pub created_at: DateTime<Utc>,
}

impl MatchedSource {
    /// Build a persistable row from a translated source match.
    pub fn from_match(record_id: &RecordId, m: &SourceMatch) -> Self {
        Self {
            id: SourceId::new(),
            record_id: record_id.clone(),
            url: m.url.clone(),
            title: m.title.clone(),
            similarity_percentage: m.similarity_percentage,
            matched_text: m.matched_text.clone(),
            domain: m.domain.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Frequency of one query text across an identity's records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCount {
    pub query: String,
    pub count: u64,
}

/// Frequency of one source domain across all identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: u64,
}

/// A source url detected by more than one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlCount {
    pub url: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> EngineReport {
        EngineReport {
            similarity_score: 42.5,
            ai_detected: true,
            ai_confidence: 87.0,
            paraphrased_text: None,
            matched_sources: vec![SourceMatch {
                url: "https://example.com/a".to_string(),
                title: "A".to_string(),
                similarity_percentage: 42.5,
                matched_text: "excerpt".to_string(),
                domain: "example.com".to_string(),
            }],
        }
    }

    #[test]
    fn new_record_starts_processing_with_empty_scores() {
        let record = AnalysisRecord::processing(IdentityId::new(), "some text");

        assert_eq!(record.status, RecordStatus::Processing);
        assert!(!record.is_terminal());
        assert_eq!(record.search_query, "some text");
        assert_eq!(record.text_length, 9);
        assert_eq!(record.similarity_score, None);
        assert_eq!(record.ai_detected, None);
        assert_eq!(record.ai_confidence, None);
        assert_eq!(record.error_message, None);
        assert_eq!(record.processing_time_ms, None);
    }

    #[test]
    fn mark_completed_populates_all_score_fields() {
        let mut record = AnalysisRecord::processing(IdentityId::new(), "text");
        record.mark_completed(&sample_report(), 120);

        assert_eq!(record.status, RecordStatus::Completed);
        assert!(record.is_terminal());
        assert_eq!(record.similarity_score, Some(42.5));
        assert_eq!(record.ai_detected, Some(true));
        assert_eq!(record.ai_confidence, Some(87.0));
        assert_eq!(record.sources_found, 1);
        assert_eq!(record.processing_time_ms, Some(120));
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn mark_failed_sets_error_and_clears_source_count() {
        let mut record = AnalysisRecord::processing(IdentityId::new(), "text");
        record.mark_failed("analysis engine timed out", 5000);

        assert_eq!(record.status, RecordStatus::Failed);
        assert!(record.is_terminal());
        assert_eq!(
            record.error_message.as_deref(),
            Some("analysis engine timed out")
        );
        assert_eq!(record.processing_time_ms, Some(5000));
        assert_eq!(record.sources_found, 0);
        assert_eq!(record.similarity_score, None);
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            RecordStatus::Pending,
            RecordStatus::Processing,
            RecordStatus::Completed,
            RecordStatus::Failed,
        ] {
            assert_eq!(RecordStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RecordStatus::parse("RUNNING"), None);
    }

    #[test]
    fn matched_source_row_inherits_record_id() {
        let record_id = RecordId::new();
        let report = sample_report();
        let row = MatchedSource::from_match(&record_id, &report.matched_sources[0]);

        assert_eq!(row.record_id, record_id);
        assert_eq!(row.domain, "example.com");
        assert_eq!(row.similarity_percentage, 42.5);
    }
}
