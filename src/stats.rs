//! Derived statistics over the analysis history.
//!
//! All figures are computed directly from store queries; the aggregator
//! holds no cached state and is safe to call concurrently with ongoing
//! orchestrations — it only observes already-committed records.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::history::{DomainCount, HistoryStore, QueryCount, RecordStatus, StorageResult, UrlCount};
use crate::identity::IdentityId;

/// Similarity score above which a search counts as "high similarity".
pub const HIGH_SIMILARITY_THRESHOLD: f64 = 50.0;

/// Window for the recent-activity count, in days.
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// How many grouped query texts to report.
const COMMON_QUERY_LIMIT: u32 = 10;

/// Per-identity statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatistics {
    pub total_searches: u64,
    /// Mean of the non-null similarity scores; 0.0 when none exist.
    pub average_similarity: f64,
    /// Searches within the last [`RECENT_WINDOW_DAYS`] days.
    pub recent_searches: u64,
    /// Searches scoring above [`HIGH_SIMILARITY_THRESHOLD`].
    pub high_similarity_searches: u64,
    pub failed_searches: u64,
    /// Percentage of non-failed searches, rounded to two decimals; 0.0
    /// when there are no searches.
    pub success_rate: f64,
    pub common_queries: Vec<QueryCount>,
}

/// System-wide statistics about source reuse across identities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatistics {
    pub common_domains: Vec<DomainCount>,
    pub duplicate_sources: Vec<UrlCount>,
}

/// Computes derived metrics from stored records. Performs no analysis.
pub struct StatisticsAggregator {
    store: Arc<dyn HistoryStore>,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Compute all per-identity figures.
    pub fn user_statistics(&self, identity: &IdentityId) -> StorageResult<UserStatistics> {
        let total_searches = self.store.count_records(identity)?;
        let average_similarity = self.store.average_similarity(identity)?.unwrap_or(0.0);

        let now = Utc::now();
        let recent_searches = self
            .store
            .records_between(identity, now - Duration::days(RECENT_WINDOW_DAYS), now)?
            .len() as u64;

        let high_similarity_searches = self
            .store
            .records_above_score(identity, HIGH_SIMILARITY_THRESHOLD)?
            .len() as u64;

        let failed_searches = self
            .store
            .records_with_status(identity, RecordStatus::Failed)?
            .len() as u64;

        let success_rate = if total_searches > 0 {
            round2((total_searches - failed_searches) as f64 / total_searches as f64 * 100.0)
        } else {
            0.0
        };

        let common_queries = self
            .store
            .most_common_queries(identity, COMMON_QUERY_LIMIT)?;

        Ok(UserStatistics {
            total_searches,
            average_similarity,
            recent_searches,
            high_similarity_searches,
            failed_searches,
            success_rate,
            common_queries,
        })
    }

    /// Compute the cross-identity source-reuse figures.
    pub fn system_statistics(&self) -> StorageResult<SystemStatistics> {
        Ok(SystemStatistics {
            common_domains: self.store.most_common_domains(COMMON_QUERY_LIMIT)?,
            duplicate_sources: self.store.duplicate_source_urls(COMMON_QUERY_LIMIT)?,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
