use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;

use crate::database_ops::db::Db;
use crate::sync::error::SyncOutcome;
use crate::sync::result::{SyncCounts, SyncLogEntry, SyncResult, SyncStage};

pub const DEFAULT_LOG_LIMIT: usize = 20;
pub const MAX_LOG_LIMIT: usize = 500;

/// Missing or non-positive limits fall back to the default; large ones are clamped.
pub fn effective_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(n) if n > 0 => (n as usize).min(MAX_LOG_LIMIT),
        _ => DEFAULT_LOG_LIMIT,
    }
}

/// Append-only store of stage results.
#[async_trait]
pub trait SyncLedger: Send + Sync {
    async fn append(&self, stage: SyncStage, result: &SyncResult) -> SyncOutcome<SyncLogEntry>;

    /// Most recent entry for `stage`.
    async fn last(&self, stage: SyncStage) -> SyncOutcome<Option<SyncLogEntry>>;

    /// Newest first, at most `limit` entries.
    async fn recent(&self, limit: usize) -> SyncOutcome<Vec<SyncLogEntry>>;
}

#[derive(Clone)]
pub struct PgSyncLedger {
    db: Db,
}

impl PgSyncLedger {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    fn entry_from_row(r: &PgRow) -> SyncLogEntry {
        let error_details: Json<Vec<String>> = r
            .try_get("error_details")
            .unwrap_or_else(|_| Json(Vec::new()));
        let count = |col: &str| r.try_get::<i64, _>(col).unwrap_or(0).max(0) as u64;
        SyncLogEntry {
            id: r.get("id"),
            stage_key: r.get("stage_key"),
            result: SyncResult {
                success: r.get("success"),
                message: r.get("message"),
                counts: SyncCounts {
                    total_processed: count("total_processed"),
                    created: count("created"),
                    updated: count("updated"),
                    skipped: count("skipped"),
                    errors: count("errors"),
                },
                duration_ms: count("duration_ms"),
                error_details: error_details.0,
            },
            created_at: r.get::<DateTime<Utc>, _>("created_at"),
        }
    }
}

const LOG_COLUMNS: &str = "id, stage_key, success, message, total_processed, created, updated, skipped, errors, duration_ms, error_details, created_at";

#[async_trait]
impl SyncLedger for PgSyncLedger {
    async fn append(&self, stage: SyncStage, result: &SyncResult) -> SyncOutcome<SyncLogEntry> {
        let c = &result.counts;
        let sql = format!(
            "INSERT INTO sync_logs (stage_key, success, message, total_processed, created, updated,
                                    skipped, errors, duration_ms, error_details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
             RETURNING {LOG_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(stage.key())
            .bind(result.success)
            .bind(&result.message)
            .bind(c.total_processed as i64)
            .bind(c.created as i64)
            .bind(c.updated as i64)
            .bind(c.skipped as i64)
            .bind(c.errors as i64)
            .bind(result.duration_ms as i64)
            .bind(Json(&result.error_details))
            .fetch_one(&self.db.pool)
            .await?;
        Ok(Self::entry_from_row(&row))
    }

    async fn last(&self, stage: SyncStage) -> SyncOutcome<Option<SyncLogEntry>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM sync_logs WHERE stage_key = $1
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(stage.key())
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row.as_ref().map(Self::entry_from_row))
    }

    async fn recent(&self, limit: usize) -> SyncOutcome<Vec<SyncLogEntry>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM sync_logs ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        let rows = sqlx::query(&sql)
            .persistent(false)
            .bind(limit as i64)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(rows.iter().map(Self::entry_from_row).collect())
    }
}
