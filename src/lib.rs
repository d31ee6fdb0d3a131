//! Veritext: text originality analysis service.
//!
//! Accepts a block of text, delegates similarity/AI-detection analysis to
//! an external engine process, durably records the outcome per requesting
//! identity, and exposes aggregate statistics over the recorded history.
//!
//! # Core pieces
//!
//! - **Engine**: the external analysis process, reached through the
//!   `AnalysisEngine` capability trait (`SubprocessEngine` in production)
//! - **Orchestrator**: the state machine that turns one request into an
//!   engine call plus a terminal COMPLETED/FAILED history record
//! - **History**: persisted records and matched-source rows with query
//!   and aggregation operations
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use veritext::{
//!     AnalysisRequest, EngineConfig, OpenHistory, SqliteHistory, StoreResolver,
//!     SubprocessEngine, VeritextApi,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteHistory::open("veritext.db")?);
//! let engine = Arc::new(SubprocessEngine::new(EngineConfig::default()));
//! let resolver = Arc::new(StoreResolver::new(store.clone()));
//! let api = VeritextApi::new(engine, store, resolver);
//!
//! let report = api.analyze("alice", AnalysisRequest::new("text to check")).await?;
//! println!("similarity: {:.1}%", report.similarity_score);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod api;
pub mod engine;
pub mod history;
pub mod identity;
pub mod stats;

pub use analysis::{AnalysisError, AnalysisOrchestrator, AnalysisReport, AnalysisRequest};
pub use api::VeritextApi;
pub use engine::translate::{EngineReport, SourceMatch, TranslateError, UNKNOWN_DOMAIN};
pub use engine::{
    AnalysisEngine, EngineConfig, EngineError, EngineOutput, EngineRequest, MockEngine,
    SubprocessEngine,
};
pub use history::{
    AnalysisRecord, DomainCount, HistoryStore, MatchedSource, OpenHistory, QueryCount, RecordId,
    RecordPage, RecordStatus, SqliteHistory, StorageError, StorageResult, UrlCount,
};
pub use identity::{Identity, IdentityId, IdentityResolver, StaticResolver, StoreResolver};
pub use stats::{StatisticsAggregator, SystemStatistics, UserStatistics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
