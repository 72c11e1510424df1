use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::sync::error::SyncError;

/// One of the synchronization stages, in pipeline order.
///
/// The derived `Ord` follows declaration order, so sorted collections of
/// stages iterate categories first and products last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    Categories,
    Manufacturers,
    Parameters,
    Products,
    Full,
}

impl SyncStage {
    /// The four entity stages a full sync runs, in foreign-key order.
    pub const PIPELINE: [SyncStage; 4] = [
        SyncStage::Categories,
        SyncStage::Manufacturers,
        SyncStage::Parameters,
        SyncStage::Products,
    ];

    /// Ledger key under which results of this stage are persisted.
    pub fn key(&self) -> &'static str {
        match self {
            SyncStage::Categories => "ASBIS_CATEGORIES",
            SyncStage::Manufacturers => "ASBIS_MANUFACTURERS",
            SyncStage::Parameters => "ASBIS_PARAMETERS",
            SyncStage::Products => "ASBIS_PRODUCTS",
            SyncStage::Full => "ASBIS_FULL",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        [
            SyncStage::Categories,
            SyncStage::Manufacturers,
            SyncStage::Parameters,
            SyncStage::Products,
            SyncStage::Full,
        ]
        .into_iter()
        .find(|s| s.key().eq_ignore_ascii_case(key) || s.as_str().eq_ignore_ascii_case(key))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Categories => "categories",
            SyncStage::Manufacturers => "manufacturers",
            SyncStage::Parameters => "parameters",
            SyncStage::Products => "products",
            SyncStage::Full => "full",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record outcome reported by a reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Created,
    Updated,
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounts {
    pub total_processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl SyncCounts {
    pub fn record(&mut self, outcome: RecordOutcome) {
        self.total_processed += 1;
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.total_processed += 1;
        self.errors += 1;
    }
}

/// Outcome of one stage invocation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub counts: SyncCounts,
    pub duration_ms: u64,
    #[serde(default)]
    pub error_details: Vec<String>,
}

impl SyncResult {
    /// Result for a stage that failed before producing per-record outcomes.
    pub fn failed(stage: SyncStage, message: impl Into<String>, duration: Duration) -> Self {
        let message = message.into();
        Self {
            success: false,
            message: format!("{} sync failed: {}", stage, message),
            counts: SyncCounts::default(),
            duration_ms: duration.as_millis() as u64,
            error_details: vec![message],
        }
    }

    pub fn total_processed(&self) -> u64 {
        self.counts.total_processed
    }
}

/// Accumulates per-record outcomes while a reconciler walks its batch.
#[derive(Debug, Default)]
pub struct SyncTally {
    counts: SyncCounts,
    error_details: Vec<String>,
}

impl SyncTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: RecordOutcome) {
        self.counts.record(outcome);
    }

    pub fn record_error(&mut self, err: &SyncError) {
        self.counts.record_error();
        self.error_details.push(err.to_string());
    }

    pub fn counts(&self) -> SyncCounts {
        self.counts
    }

    /// A stage succeeds unless every record it saw failed to map.
    pub fn finish(self, stage: SyncStage, duration: Duration) -> SyncResult {
        let c = self.counts;
        let success = c.errors == 0 || c.errors < c.total_processed;
        let message = format!(
            "{} sync {}: {} processed, {} created, {} updated, {} skipped, {} errors",
            stage,
            if success { "completed" } else { "failed" },
            c.total_processed,
            c.created,
            c.updated,
            c.skipped,
            c.errors
        );
        SyncResult {
            success,
            message,
            counts: c,
            duration_ms: duration.as_millis() as u64,
            error_details: self.error_details,
        }
    }
}

/// Uniform result of invoking one stage from the orchestration layer.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Completed(SyncResult),
    Failed { message: String, duration: Duration },
}

impl StageOutcome {
    pub fn from_result(result: Result<SyncResult, SyncError>, duration: Duration) -> Self {
        match result {
            Ok(r) => StageOutcome::Completed(r),
            Err(e) => StageOutcome::Failed {
                message: e.to_string(),
                duration,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Completed(r) if r.success)
    }

    pub fn into_result(self, stage: SyncStage) -> SyncResult {
        match self {
            StageOutcome::Completed(r) => r,
            StageOutcome::Failed { message, duration } => {
                SyncResult::failed(stage, message, duration)
            }
        }
    }
}

/// Persisted ledger row for a past stage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: i64,
    pub stage_key: String,
    #[serde(flatten)]
    pub result: SyncResult,
    pub created_at: DateTime<Utc>,
}
