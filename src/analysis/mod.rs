//! Analysis orchestration.
//!
//! Turns one caller request into an engine invocation, a translated
//! result, and a terminal history record, with partial failure tracked in
//! the record's status.

mod orchestrator;
mod types;

pub use orchestrator::AnalysisOrchestrator;
pub use types::{AnalysisError, AnalysisReport, AnalysisRequest};
