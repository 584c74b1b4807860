//! Summary persistence.
//!
//! The pipeline talks to storage only through [`SummaryStore`]. Every
//! lookup is scoped by owner: a summary belonging to someone else behaves
//! exactly like a missing one.

use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::{StoredSummary, TargetLanguage};

/// Storage collaborator for generated narratives.
pub trait SummaryStore: Send + Sync {
    /// Does a summary with this id exist for this owner?
    fn exists(&self, id: &Uuid, owner_id: &str) -> Result<bool, DatabaseError>;

    /// Persist a newly generated narrative, returning its id.
    fn save(
        &self,
        owner_id: &str,
        language: TargetLanguage,
        summary_text: &str,
        source_filename: Option<&str>,
    ) -> Result<Uuid, DatabaseError>;

    /// Fetch one summary for its owner.
    fn get(&self, id: &Uuid, owner_id: &str) -> Result<Option<StoredSummary>, DatabaseError>;

    /// All summaries of an owner, newest first.
    fn list(&self, owner_id: &str) -> Result<Vec<StoredSummary>, DatabaseError>;
}

/// SQLite-backed store. `rusqlite::Connection` is `!Sync`, so access is
/// serialized behind a mutex; statements are short-lived.
pub struct SqliteSummaryStore {
    conn: Mutex<Connection>,
}

impl SqliteSummaryStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

struct SummaryRow {
    id: String,
    owner_id: String,
    language: String,
    summary_text: String,
    source_filename: Option<String>,
    created_at: String,
}

fn summary_from_row(row: SummaryRow) -> Result<StoredSummary, DatabaseError> {
    let id = Uuid::parse_str(&row.id).map_err(|_| DatabaseError::InvalidEnum {
        field: "summaries.id".into(),
        value: row.id.clone(),
    })?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidEnum {
            field: "summaries.created_at".into(),
            value: row.created_at.clone(),
        })?;

    Ok(StoredSummary {
        id,
        owner_id: row.owner_id,
        language: TargetLanguage::from_str(&row.language)?,
        summary_text: row.summary_text,
        source_filename: row.source_filename,
        created_at,
    })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        language: row.get(2)?,
        summary_text: row.get(3)?,
        source_filename: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl SummaryStore for SqliteSummaryStore {
    fn exists(&self, id: &Uuid, owner_id: &str) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM summaries WHERE id = ?1 AND owner_id = ?2",
                params![id.to_string(), owner_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    fn save(
        &self,
        owner_id: &str,
        language: TargetLanguage,
        summary_text: &str,
        source_filename: Option<&str>,
    ) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO summaries (id, owner_id, language, summary_text, source_filename, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    owner_id,
                    language.name(),
                    summary_text,
                    source_filename,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;
        tracing::debug!(summary_id = %id, owner = owner_id, "Summary persisted");
        Ok(id)
    }

    fn get(&self, id: &Uuid, owner_id: &str) -> Result<Option<StoredSummary>, DatabaseError> {
        self.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT id, owner_id, language, summary_text, source_filename, created_at
                 FROM summaries WHERE id = ?1 AND owner_id = ?2",
                params![id.to_string(), owner_id],
                read_row,
            );
            match result {
                Ok(row) => Ok(Some(summary_from_row(row)?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn list(&self, owner_id: &str) -> Result<Vec<StoredSummary>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, language, summary_text, source_filename, created_at
                 FROM summaries WHERE owner_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![owner_id], read_row)?;
            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(summary_from_row(row?)?);
            }
            Ok(summaries)
        })
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Store whose every operation fails, for best-effort persistence paths.
pub struct FailingSummaryStore;

impl SummaryStore for FailingSummaryStore {
    fn exists(&self, _id: &Uuid, _owner_id: &str) -> Result<bool, DatabaseError> {
        Err(DatabaseError::LockPoisoned)
    }

    fn save(
        &self,
        _owner_id: &str,
        _language: TargetLanguage,
        _summary_text: &str,
        _source_filename: Option<&str>,
    ) -> Result<Uuid, DatabaseError> {
        Err(DatabaseError::LockPoisoned)
    }

    fn get(&self, _id: &Uuid, _owner_id: &str) -> Result<Option<StoredSummary>, DatabaseError> {
        Err(DatabaseError::LockPoisoned)
    }

    fn list(&self, _owner_id: &str) -> Result<Vec<StoredSummary>, DatabaseError> {
        Err(DatabaseError::LockPoisoned)
    }
}
