//! History store trait definitions.

use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

use super::types::{
    AnalysisRecord, DomainCount, MatchedSource, QueryCount, RecordId, RecordStatus, UrlCount,
};
use crate::identity::{Identity, IdentityId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("identity already exists: {0}")]
    IdentityExists(String),

    #[error("invalid status value: {0}")]
    InvalidStatus(String),

    #[error("timestamp parse error: {0}")]
    DateParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// One page of an identity's history, newest first.
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub records: Vec<AnalysisRecord>,
    /// Total records for the identity, across all pages.
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

impl RecordPage {
    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total.div_ceil(self.size as u64)
    }
}

/// Trait for analysis-history storage backends.
///
/// Implementations must be thread-safe (Send + Sync); concurrent
/// orchestrations share one store and rely on per-row atomic writes.
/// Read operations are identity-scoped except the domain/duplicate
/// queries, which describe source reuse across all identities.
pub trait HistoryStore: Send + Sync {
    // === Identity Operations ===

    /// Insert a new identity row.
    fn insert_identity(&self, identity: &Identity) -> StorageResult<()>;

    /// Look up an identity by username.
    fn find_identity(&self, username: &str) -> StorageResult<Option<Identity>>;

    /// List all identities.
    fn list_identities(&self) -> StorageResult<Vec<Identity>>;

    // === Record Operations ===

    /// Insert a freshly created record (normally in PROCESSING state).
    fn insert_record(&self, record: &AnalysisRecord) -> StorageResult<()>;

    /// Persist the current state of an existing record.
    fn update_record(&self, record: &AnalysisRecord) -> StorageResult<()>;

    /// Load a record by id.
    fn get_record(&self, id: &RecordId) -> StorageResult<Option<AnalysisRecord>>;

    /// Paginated history for an identity, newest first.
    fn records_page(&self, identity: &IdentityId, page: u32, size: u32)
        -> StorageResult<RecordPage>;

    /// Most recent records for an identity.
    fn recent_records(&self, identity: &IdentityId, limit: u32)
        -> StorageResult<Vec<AnalysisRecord>>;

    /// Records created within a time range, newest first.
    fn records_between(
        &self,
        identity: &IdentityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<AnalysisRecord>>;

    /// Records with similarity score above a threshold, highest first.
    fn records_above_score(
        &self,
        identity: &IdentityId,
        threshold: f64,
    ) -> StorageResult<Vec<AnalysisRecord>>;

    /// Records in a given status, newest first.
    fn records_with_status(
        &self,
        identity: &IdentityId,
        status: RecordStatus,
    ) -> StorageResult<Vec<AnalysisRecord>>;

    /// Records whose query text contains the fragment, newest first.
    fn records_matching(
        &self,
        identity: &IdentityId,
        fragment: &str,
    ) -> StorageResult<Vec<AnalysisRecord>>;

    /// Total records for an identity.
    fn count_records(&self, identity: &IdentityId) -> StorageResult<u64>;

    /// Average similarity score over scored records; `None` when no
    /// record has a score.
    fn average_similarity(&self, identity: &IdentityId) -> StorageResult<Option<f64>>;

    /// Most frequently submitted query texts for an identity.
    fn most_common_queries(
        &self,
        identity: &IdentityId,
        limit: u32,
    ) -> StorageResult<Vec<QueryCount>>;

    // === Matched Source Operations ===

    /// Insert one matched-source row.
    fn insert_source(&self, source: &MatchedSource) -> StorageResult<()>;

    /// All sources for a record, highest similarity first.
    fn sources_for_record(&self, record: &RecordId) -> StorageResult<Vec<MatchedSource>>;

    /// Number of source rows persisted for a record.
    fn count_sources(&self, record: &RecordId) -> StorageResult<u64>;

    /// Delete all source rows for a record, returning the count removed.
    fn delete_sources_for_record(&self, record: &RecordId) -> StorageResult<u64>;

    /// All sources matched under a domain, across identities.
    fn sources_for_domain(&self, domain: &str) -> StorageResult<Vec<MatchedSource>>;

    /// Most frequently matched domains, across identities.
    fn most_common_domains(&self, limit: u32) -> StorageResult<Vec<DomainCount>>;

    /// Urls matched by more than one analysis, across identities.
    fn duplicate_source_urls(&self, limit: u32) -> StorageResult<Vec<UrlCount>>;

    // === Retention ===

    /// Bulk-delete records created before the cutoff, cascading to their
    /// source rows. Returns the number of records removed.
    fn delete_records_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}

/// Extension trait for opening stores from paths.
pub trait OpenHistory: HistoryStore + Sized {
    /// Open or create a store at the given path.
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing).
    fn open_in_memory() -> StorageResult<Self>;
}
