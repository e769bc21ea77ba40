//! SQLite-backed record store.

use crate::events::timestamp::{format_rfc3339, parse_lenient};
use crate::knowledge::store::{CasOutcome, KnowledgeStore, StoreError};
use crate::knowledge::types::{KnowledgeRecord, ProcessingStatus, StatusUpdate};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS knowledge (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        content_type TEXT NOT NULL,
        mime_type TEXT,
        size INTEGER,
        source TEXT NOT NULL,
        processing_status TEXT NOT NULL,
        error_details TEXT,
        error_code TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_status ON knowledge (processing_status)",
];

const SELECT_COLUMNS: &str = "id, project_id, name, content_type, mime_type, size, source, \
    processing_status, error_details, error_code, created_at, updated_at";

/// Record store persisting to a SQLite database.
#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    /// Open (creating if needed) the database at `url` and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        if !in_memory
            && let Some(parent) = database_path(url).and_then(Path::parent)
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its single connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(url, "Knowledge store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn database_path(url: &str) -> Option<&Path> {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .map(|rest| rest.split('?').next().unwrap_or(rest))
        .filter(|rest| !rest.is_empty())
        .map(Path::new)
}

fn map_row(row: &SqliteRow) -> Result<KnowledgeRecord, StoreError> {
    let id: String = row.try_get("id")?;
    let size: Option<i64> = row.try_get("size")?;
    let content_type: String = row.try_get("content_type")?;
    let status: String = row.try_get("processing_status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(KnowledgeRecord {
        id: Uuid::parse_str(&id).map_err(|err| StoreError::Corrupt(format!("id {id}: {err}")))?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        content_type: content_type.parse().map_err(StoreError::Corrupt)?,
        mime_type: row.try_get("mime_type")?,
        size: size
            .map(u64::try_from)
            .transpose()
            .map_err(|err| StoreError::Corrupt(format!("size: {err}")))?,
        source: row.try_get("source")?,
        processing_status: status.parse().map_err(StoreError::Corrupt)?,
        error_details: row.try_get("error_details")?,
        error_code: row.try_get("error_code")?,
        created_at: parse_lenient(&created_at)
            .map_err(|err| StoreError::Corrupt(format!("created_at: {err}")))?,
        updated_at: parse_lenient(&updated_at)
            .map_err(|err| StoreError::Corrupt(format!("updated_at: {err}")))?,
    })
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn create(&self, record: &KnowledgeRecord) -> Result<(), StoreError> {
        let size = record
            .size
            .map(i64::try_from)
            .transpose()
            .map_err(|err| StoreError::Corrupt(format!("size: {err}")))?;

        let result = sqlx::query(
            "INSERT INTO knowledge (id, project_id, name, content_type, mime_type, size, source, \
             processing_status, error_details, error_code, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.project_id)
        .bind(&record.name)
        .bind(record.content_type.as_str())
        .bind(&record.mime_type)
        .bind(size)
        .bind(&record.source)
        .bind(record.processing_status.as_str())
        .bind(&record.error_details)
        .bind(&record.error_code)
        .bind(format_rfc3339(record.created_at))
        .bind(format_rfc3339(record.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(StoreError::Duplicate(record.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<KnowledgeRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM knowledge WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_row).transpose()
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ProcessingStatus,
        update: &StatusUpdate,
    ) -> Result<CasOutcome, StoreError> {
        let (details, code) = match update {
            StatusUpdate::Succeeded => (None, None),
            StatusUpdate::Failed { details, code } => (Some(details.as_str()), code.as_deref()),
        };

        let result = sqlx::query(
            "UPDATE knowledge SET processing_status = ?, error_details = ?, error_code = ?, \
             updated_at = ? WHERE id = ? AND processing_status = ?",
        )
        .bind(update.status().as_str())
        .bind(details)
        .bind(code)
        .bind(format_rfc3339(OffsetDateTime::now_utc()))
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        let current = self.get(id).await?;
        Ok(match (result.rows_affected(), current) {
            (_, None) => CasOutcome::Missing,
            (0, Some(record)) => CasOutcome::Conflict(record.processing_status),
            (_, Some(record)) => CasOutcome::Applied(record),
        })
    }
}
