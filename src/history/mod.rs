//! Analysis history persistence.
//!
//! The history store owns one `AnalysisRecord` per orchestration attempt
//! and the `MatchedSource` rows produced by successful attempts. Backends
//! implement the `HistoryStore` trait; the primary implementation is
//! `SqliteHistory`.

mod sqlite;
mod traits;
mod types;

pub use sqlite::SqliteHistory;
pub use traits::{HistoryStore, OpenHistory, RecordPage, StorageError, StorageResult};
pub use types::{
    AnalysisRecord, DomainCount, MatchedSource, QueryCount, RecordId, RecordStatus, SourceId,
    UrlCount,
};
