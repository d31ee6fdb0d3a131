//! Core types for the analysis pipeline: the caller-supplied request, the
//! caller-facing report, and the error taxonomy.

use serde::{Deserialize, Serialize};

use crate::engine::translate::{EngineReport, SourceMatch, TranslateError};
use crate::engine::EngineError;
use crate::history::{RecordId, StorageError};

/// One analysis request as submitted by a caller.
///
/// Immutable and not persisted directly; the orchestrator derives the
/// persisted record from it. Text may be empty — the engine decides
/// validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
    #[serde(default)]
    pub check_paraphrasing: bool,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            check_paraphrasing: false,
        }
    }

    pub fn with_paraphrasing(mut self, enabled: bool) -> Self {
        self.check_paraphrasing = enabled;
        self
    }
}

/// Caller-facing result of one successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Id of the persisted record for this attempt.
    pub record_id: RecordId,
    pub similarity_score: f64,
    pub ai_detected: bool,
    /// AI-detection confidence, 0–100.
    pub ai_confidence: f64,
    pub paraphrased_text: Option<String>,
    pub matched_sources: Vec<SourceMatch>,
    pub processing_time_ms: u64,
}

impl AnalysisReport {
    pub(crate) fn from_engine_report(
        record_id: RecordId,
        report: EngineReport,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            record_id,
            similarity_score: report.similarity_score,
            ai_detected: report.ai_detected,
            ai_confidence: report.ai_confidence,
            paraphrased_text: report.paraphrased_text,
            matched_sources: report.matched_sources,
            processing_time_ms,
        }
    }
}

/// Caller-facing error taxonomy.
///
/// Display strings are the user-safe summaries stored on FAILED records
/// and returned to callers; raw engine output and parse details stay in
/// server-side logs only.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// No resolvable identity; raised before any record is created.
    #[error("authentication required")]
    AuthorizationRequired,

    #[error("analysis engine timed out")]
    EngineTimeout,

    #[error("analysis engine failed")]
    EngineProcessFailure,

    #[error("analysis engine returned malformed output")]
    EngineMalformedOutput,

    /// The engine's payload explicitly carried an error message.
    #[error("analysis engine reported an error: {0}")]
    EngineReported(String),

    #[error("failed to persist analysis results")]
    Persistence(#[source] StorageError),

    #[error("record not found")]
    RecordNotFound,
}

impl AnalysisError {
    /// Map an invocation failure onto the caller-facing taxonomy.
    pub(crate) fn from_engine(error: &EngineError) -> Self {
        match error {
            EngineError::Timeout(_) => AnalysisError::EngineTimeout,
            // a process that never started has no exit code to report; the
            // caller-facing summary is the same as a failed one
            EngineError::Spawn(_) | EngineError::Process { .. } => {
                AnalysisError::EngineProcessFailure
            }
            EngineError::MalformedOutput(_) => AnalysisError::EngineMalformedOutput,
        }
    }

    /// Map a translation failure onto the caller-facing taxonomy.
    pub(crate) fn from_translate(error: &TranslateError) -> Self {
        match error {
            TranslateError::EngineReported(message) => {
                AnalysisError::EngineReported(message.clone())
            }
            TranslateError::WrongType { .. }
            | TranslateError::OutOfRange { .. }
            | TranslateError::MalformedSource { .. } => AnalysisError::EngineMalformedOutput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_user_safe_kinds() {
        let err = AnalysisError::from_engine(&EngineError::Timeout(60));
        assert!(matches!(err, AnalysisError::EngineTimeout));

        let err = AnalysisError::from_engine(&EngineError::Process {
            exit_code: 2,
            output: "Traceback (most recent call last): ...".to_string(),
        });
        assert!(matches!(err, AnalysisError::EngineProcessFailure));
        // raw output never reaches the caller-facing message
        assert!(!err.to_string().contains("Traceback"));

        let err = AnalysisError::from_engine(&EngineError::MalformedOutput("x".to_string()));
        assert!(matches!(err, AnalysisError::EngineMalformedOutput));
    }

    #[test]
    fn translation_errors_map_to_user_safe_kinds() {
        let err = AnalysisError::from_translate(&TranslateError::WrongType {
            field: "similarityScore".to_string(),
        });
        assert!(matches!(err, AnalysisError::EngineMalformedOutput));

        let err = AnalysisError::from_translate(&TranslateError::EngineReported(
            "no results".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "analysis engine reported an error: no results"
        );
    }
}
