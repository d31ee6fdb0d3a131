//! Analysis engine client — integration with the external similarity /
//! AI-detection engine.
//!
//! Defines the engine capability trait and its failure taxonomy. Two
//! implementations:
//! - `SubprocessEngine`: runs the engine as a bounded external process
//!   (production)
//! - `MockEngine`: returns preconfigured payloads (testing)
//!
//! The engine is a black box: it receives the text and flags, and emits a
//! loosely-typed JSON payload that the translator (`translate`) validates
//! into the strict result model.

mod subprocess;
pub mod translate;

pub use subprocess::{EngineConfig, SubprocessEngine};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One engine invocation: the text to analyze and its option flags.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    /// Text to analyze. May be empty; the engine decides validity.
    pub text: String,
    /// Ask the engine for paraphrase detection as well.
    pub check_paraphrasing: bool,
}

impl EngineRequest {
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

/// Raw engine payload, parsed as JSON but not yet validated.
///
/// Field-level validation happens in [`translate`]; nothing downstream of
/// the translator sees this loosely-typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub payload: serde_json::Value,
}

impl EngineOutput {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

/// Errors from invoking the external engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The engine process could not be started at all.
    #[error("failed to start analysis engine: {0}")]
    Spawn(String),

    /// The engine did not exit within the configured bound.
    #[error("analysis engine timed out after {0} seconds")]
    Timeout(u64),

    /// The engine exited with a non-zero code. The captured output is
    /// kept for server-side diagnostics and never surfaced to callers.
    #[error("analysis engine exited with code {exit_code}")]
    Process { exit_code: i32, output: String },

    /// Exit code zero, but stdout was not the expected structured format.
    #[error("analysis engine produced unparseable output: {0}")]
    MalformedOutput(String),
}

/// Capability trait for the external analysis engine.
///
/// Abstracts over how the engine is reached (subprocess, RPC, in-process)
/// so the orchestrator doesn't depend on the transport.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Short identifier for logging.
    fn id(&self) -> &str;

    /// Run one analysis, returning the raw payload or a typed failure.
    async fn invoke(&self, request: &EngineRequest) -> Result<EngineOutput, EngineError>;
}

/// Mock engine for testing — yields queued payloads in FIFO order.
#[derive(Default)]
pub struct MockEngine {
    responses: Mutex<VecDeque<Result<serde_json::Value, EngineError>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful payload.
    pub fn with_payload(self, payload: serde_json::Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(payload));
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, error: EngineError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }
}

#[async_trait]
impl AnalysisEngine for MockEngine {
    fn id(&self) -> &str {
        "mock-engine"
    }

    async fn invoke(&self, _request: &EngineRequest) -> Result<EngineOutput, EngineError> {
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(payload)) => Ok(EngineOutput::new(payload)),
            Some(Err(error)) => Err(error),
            None => Err(EngineError::Spawn(
                "mock engine has no queued response".to_string(),
            )),
        }
    }
}

/// Helper to construct a well-formed success payload for testing.
pub fn mock_payload(similarity_score: f64, ai_detected: bool, ai_confidence: f64) -> serde_json::Value {
    serde_json::json!({
        "similarityScore": similarity_score,
        "aiDetected": ai_detected,
        "aiConfidence": ai_confidence,
        "matchedSources": [],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_engine_yields_queued_payloads_in_order() {
        let engine = MockEngine::new()
            .with_payload(mock_payload(10.0, false, 5.0))
            .with_payload(mock_payload(90.0, true, 80.0));

        let first = engine.invoke(&EngineRequest::new("a")).await.unwrap();
        assert_eq!(first.payload["similarityScore"], 10.0);

        let second = engine.invoke(&EngineRequest::new("b")).await.unwrap();
        assert_eq!(second.payload["similarityScore"], 90.0);
    }

    #[tokio::test]
    async fn mock_engine_yields_queued_failure() {
        let engine = MockEngine::new().with_failure(EngineError::Timeout(60));

        let err = engine.invoke(&EngineRequest::new("a")).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(60)));
    }

    #[tokio::test]
    async fn exhausted_mock_engine_errors() {
        let engine = MockEngine::new();

        let err = engine.invoke(&EngineRequest::new("a")).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn(_)));
    }

    #[test]
    fn request_builder_sets_paraphrasing() {
        let request = EngineRequest::new("text").with_paraphrasing(true);
        assert!(request.check_paraphrasing);
        assert_eq!(request.text, "text");
    }
}
