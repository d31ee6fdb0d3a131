//! SQLite storage backend for analysis history.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{HistoryStore, OpenHistory, RecordPage, StorageError, StorageResult};
use super::types::{
    AnalysisRecord, DomainCount, MatchedSource, QueryCount, RecordId, RecordStatus, SourceId,
    UrlCount,
};
use crate::identity::{Identity, IdentityId};

/// Column list shared by every record SELECT so row mapping stays in one place.
const RECORD_COLUMNS: &str = "id, identity_id, search_query, text_length, similarity_score, \
     ai_detected, ai_confidence, sources_found, processing_time_ms, status, error_message, \
     created_at";

const SOURCE_COLUMNS: &str =
    "id, record_id, url, title, similarity_percentage, matched_text, domain, created_at";

/// SQLite-backed history store.
///
/// Uses a single database file with tables for identities, analysis
/// records, and matched sources. Thread-safe via internal mutex on the
/// connection; matched sources cascade-delete with their parent record.
pub struct SqliteHistory {
    conn: Mutex<Connection>,
}

/// Uniform timestamp encoding: millisecond RFC 3339 in UTC, so that
/// lexicographic TEXT comparison matches chronological order.
fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_ts(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(format!("{raw}: {e}")))
}

/// Raw record row as read from the database, before status/timestamp
/// decoding.
type RecordRow = (
    String,         // id
    String,         // identity_id
    String,         // search_query
    i64,            // text_length
    Option<f64>,    // similarity_score
    Option<bool>,   // ai_detected
    Option<f64>,    // ai_confidence
    i64,            // sources_found
    Option<i64>,    // processing_time_ms
    String,         // status
    Option<String>, // error_message
    String,         // created_at
);

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

fn row_to_record(raw: RecordRow) -> StorageResult<AnalysisRecord> {
    let (
        id,
        identity_id,
        search_query,
        text_length,
        similarity_score,
        ai_detected,
        ai_confidence,
        sources_found,
        processing_time_ms,
        status,
        error_message,
        created_at,
    ) = raw;

    let status =
        RecordStatus::parse(&status).ok_or_else(|| StorageError::InvalidStatus(status.clone()))?;

    Ok(AnalysisRecord {
        id: RecordId::from_string(id),
        identity_id: IdentityId::from_string(identity_id),
        search_query,
        text_length: text_length as u32,
        similarity_score,
        ai_detected,
        ai_confidence,
        sources_found: sources_found as u32,
        processing_time_ms: processing_time_ms.map(|v| v as u64),
        status,
        error_message,
        created_at: decode_ts(&created_at)?,
    })
}

type SourceRow = (String, String, String, String, f64, String, String, String);

fn read_source_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn row_to_source(raw: SourceRow) -> StorageResult<MatchedSource> {
    let (id, record_id, url, title, similarity_percentage, matched_text, domain, created_at) = raw;
    Ok(MatchedSource {
        id: SourceId::from_string(id),
        record_id: RecordId::from_string(record_id),
        url,
        title,
        similarity_percentage,
        matched_text,
        domain,
        created_at: decode_ts(&created_at)?,
    })
}

impl SqliteHistory {
    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Identities table
            CREATE TABLE IF NOT EXISTS identities (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            -- One row per analysis attempt
            CREATE TABLE IF NOT EXISTS analysis_records (
                id TEXT PRIMARY KEY,
                identity_id TEXT NOT NULL,
                search_query TEXT NOT NULL,
                text_length INTEGER NOT NULL,
                similarity_score REAL,
                ai_detected INTEGER,
                ai_confidence REAL,
                sources_found INTEGER NOT NULL DEFAULT 0,
                processing_time_ms INTEGER,
                status TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (identity_id) REFERENCES identities(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_records_identity_created
                ON analysis_records(identity_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_records_identity_status
                ON analysis_records(identity_id, status);
            CREATE INDEX IF NOT EXISTS idx_records_created
                ON analysis_records(created_at);

            -- Matched sources, owned by their parent record
            CREATE TABLE IF NOT EXISTS matched_sources (
                id TEXT PRIMARY KEY,
                record_id TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                similarity_percentage REAL NOT NULL,
                matched_text TEXT NOT NULL,
                domain TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (record_id) REFERENCES analysis_records(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_sources_record
                ON matched_sources(record_id);
            CREATE INDEX IF NOT EXISTS idx_sources_domain
                ON matched_sources(domain);
            CREATE INDEX IF NOT EXISTS idx_sources_url
                ON matched_sources(url);

            -- Enable foreign keys (needed for ON DELETE CASCADE)
            PRAGMA foreign_keys = ON;

            -- WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn query_records(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, read_record_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(row_to_record).collect()
    }

    fn query_sources(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<MatchedSource>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, read_source_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(row_to_source).collect()
    }
}

impl OpenHistory for SqliteHistory {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl HistoryStore for SqliteHistory {
    // === Identity Operations ===

    fn insert_identity(&self, identity: &Identity) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO identities (id, username, created_at) VALUES (?1, ?2, ?3)",
            params![
                identity.id.as_str(),
                identity.username,
                encode_ts(&identity.created_at)
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::IdentityExists(identity.username.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_identity(&self, username: &str) -> StorageResult<Option<Identity>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT id, username, created_at FROM identities WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((id, username, created_at)) => Ok(Some(Identity {
                id: IdentityId::from_string(id),
                username,
                created_at: decode_ts(&created_at)?,
            })),
            None => Ok(None),
        }
    }

    fn list_identities(&self) -> StorageResult<Vec<Identity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, username, created_at FROM identities ORDER BY username")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, username, created_at)| {
                Ok(Identity {
                    id: IdentityId::from_string(id),
                    username,
                    created_at: decode_ts(&created_at)?,
                })
            })
            .collect()
    }

    // === Record Operations ===

    fn insert_record(&self, record: &AnalysisRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO analysis_records
                (id, identity_id, search_query, text_length, similarity_score,
                 ai_detected, ai_confidence, sources_found, processing_time_ms,
                 status, error_message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                record.id.as_str(),
                record.identity_id.as_str(),
                record.search_query,
                record.text_length as i64,
                record.similarity_score,
                record.ai_detected,
                record.ai_confidence,
                record.sources_found as i64,
                record.processing_time_ms.map(|v| v as i64),
                record.status.as_str(),
                record.error_message,
                encode_ts(&record.created_at),
            ],
        )?;
        Ok(())
    }

    fn update_record(&self, record: &AnalysisRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE analysis_records SET
                similarity_score = ?2,
                ai_detected = ?3,
                ai_confidence = ?4,
                sources_found = ?5,
                processing_time_ms = ?6,
                status = ?7,
                error_message = ?8
            WHERE id = ?1
            "#,
            params![
                record.id.as_str(),
                record.similarity_score,
                record.ai_detected,
                record.ai_confidence,
                record.sources_found as i64,
                record.processing_time_ms.map(|v| v as i64),
                record.status.as_str(),
                record.error_message,
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::RecordNotFound(record.id.to_string()));
        }
        Ok(())
    }

    fn get_record(&self, id: &RecordId) -> StorageResult<Option<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM analysis_records WHERE id = ?1"),
                params![id.as_str()],
                read_record_row,
            )
            .optional()?;

        raw.map(row_to_record).transpose()
    }

    fn records_page(
        &self,
        identity: &IdentityId,
        page: u32,
        size: u32,
    ) -> StorageResult<RecordPage> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM analysis_records WHERE identity_id = ?1",
            params![identity.as_str()],
            |row| row.get(0),
        )?;

        let records = Self::query_records(
            &conn,
            &format!(
                "SELECT {RECORD_COLUMNS} FROM analysis_records
                 WHERE identity_id = ?1
                 ORDER BY created_at DESC, id
                 LIMIT ?2 OFFSET ?3"
            ),
            params![
                identity.as_str(),
                size as i64,
                (page as i64) * (size as i64)
            ],
        )?;

        Ok(RecordPage {
            records,
            total: total as u64,
            page,
            size,
        })
    }

    fn recent_records(
        &self,
        identity: &IdentityId,
        limit: u32,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::query_records(
            &conn,
            &format!(
                "SELECT {RECORD_COLUMNS} FROM analysis_records
                 WHERE identity_id = ?1
                 ORDER BY created_at DESC, id
                 LIMIT ?2"
            ),
            params![identity.as_str(), limit as i64],
        )
    }

    fn records_between(
        &self,
        identity: &IdentityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::query_records(
            &conn,
            &format!(
                "SELECT {RECORD_COLUMNS} FROM analysis_records
                 WHERE identity_id = ?1 AND created_at >= ?2 AND created_at <= ?3
                 ORDER BY created_at DESC, id"
            ),
            params![identity.as_str(), encode_ts(&start), encode_ts(&end)],
        )
    }

    fn records_above_score(
        &self,
        identity: &IdentityId,
        threshold: f64,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::query_records(
            &conn,
            &format!(
                "SELECT {RECORD_COLUMNS} FROM analysis_records
                 WHERE identity_id = ?1 AND similarity_score > ?2
                 ORDER BY similarity_score DESC, id"
            ),
            params![identity.as_str(), threshold],
        )
    }

    fn records_with_status(
        &self,
        identity: &IdentityId,
        status: RecordStatus,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::query_records(
            &conn,
            &format!(
                "SELECT {RECORD_COLUMNS} FROM analysis_records
                 WHERE identity_id = ?1 AND status = ?2
                 ORDER BY created_at DESC, id"
            ),
            params![identity.as_str(), status.as_str()],
        )
    }

    fn records_matching(
        &self,
        identity: &IdentityId,
        fragment: &str,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        // ESCAPE so user-supplied % and _ match literally
        let escaped = fragment
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Self::query_records(
            &conn,
            &format!(
                "SELECT {RECORD_COLUMNS} FROM analysis_records
                 WHERE identity_id = ?1 AND search_query LIKE ?2 ESCAPE '\\'
                 ORDER BY created_at DESC, id"
            ),
            params![identity.as_str(), format!("%{escaped}%")],
        )
    }

    fn count_records(&self, identity: &IdentityId) -> StorageResult<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM analysis_records WHERE identity_id = ?1",
            params![identity.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn average_similarity(&self, identity: &IdentityId) -> StorageResult<Option<f64>> {
        let conn = self.conn.lock().unwrap();
        let avg: Option<f64> = conn.query_row(
            "SELECT AVG(similarity_score) FROM analysis_records
             WHERE identity_id = ?1 AND similarity_score IS NOT NULL",
            params![identity.as_str()],
            |row| row.get(0),
        )?;
        Ok(avg)
    }

    fn most_common_queries(
        &self,
        identity: &IdentityId,
        limit: u32,
    ) -> StorageResult<Vec<QueryCount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT search_query, COUNT(*) AS freq FROM analysis_records
             WHERE identity_id = ?1
             GROUP BY search_query
             ORDER BY freq DESC, search_query
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![identity.as_str(), limit as i64], |row| {
                Ok(QueryCount {
                    query: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // === Matched Source Operations ===

    fn insert_source(&self, source: &MatchedSource) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO matched_sources
                (id, record_id, url, title, similarity_percentage, matched_text,
                 domain, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                source.id.as_str(),
                source.record_id.as_str(),
                source.url,
                source.title,
                source.similarity_percentage,
                source.matched_text,
                source.domain,
                encode_ts(&source.created_at),
            ],
        )?;
        Ok(())
    }

    fn sources_for_record(&self, record: &RecordId) -> StorageResult<Vec<MatchedSource>> {
        let conn = self.conn.lock().unwrap();
        Self::query_sources(
            &conn,
            &format!(
                "SELECT {SOURCE_COLUMNS} FROM matched_sources
                 WHERE record_id = ?1
                 ORDER BY similarity_percentage DESC, id"
            ),
            params![record.as_str()],
        )
    }

    fn count_sources(&self, record: &RecordId) -> StorageResult<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM matched_sources WHERE record_id = ?1",
            params![record.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn delete_sources_for_record(&self, record: &RecordId) -> StorageResult<u64> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM matched_sources WHERE record_id = ?1",
            params![record.as_str()],
        )?;
        Ok(deleted as u64)
    }

    fn sources_for_domain(&self, domain: &str) -> StorageResult<Vec<MatchedSource>> {
        let conn = self.conn.lock().unwrap();
        Self::query_sources(
            &conn,
            &format!(
                "SELECT {SOURCE_COLUMNS} FROM matched_sources
                 WHERE domain = ?1
                 ORDER BY similarity_percentage DESC, id"
            ),
            params![domain],
        )
    }

    fn most_common_domains(&self, limit: u32) -> StorageResult<Vec<DomainCount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT domain, COUNT(*) AS freq FROM matched_sources
             GROUP BY domain
             ORDER BY freq DESC, domain
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(DomainCount {
                    domain: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn duplicate_source_urls(&self, limit: u32) -> StorageResult<Vec<UrlCount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT url, COUNT(*) AS freq FROM matched_sources
             GROUP BY url
             HAVING freq > 1
             ORDER BY freq DESC, url
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(UrlCount {
                    url: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // === Retention ===

    fn delete_records_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM analysis_records WHERE created_at < ?1",
            params![encode_ts(&cutoff)],
        )?;
        Ok(deleted as u64)
    }
}
