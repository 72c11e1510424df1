use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::sync::orchestrator::SyncOrchestrator;
use crate::sync::result::{SyncCounts, SyncResult, SyncStage};
use crate::sync::vendor::VendorCatalog;

/// Aggregate outcome of a full run. `per_stage` iterates in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncReport {
    pub success: bool,
    pub message: String,
    pub per_stage: BTreeMap<SyncStage, SyncResult>,
    pub total_duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl FullSyncReport {
    pub fn failed_stages(&self) -> Vec<SyncStage> {
        self.per_stage
            .iter()
            .filter(|(_, r)| !r.success)
            .map(|(s, _)| *s)
            .collect()
    }

    /// Sum of the stage results, as recorded under `ASBIS_FULL`.
    pub fn summary_result(&self) -> SyncResult {
        let mut counts = SyncCounts::default();
        let mut error_details = Vec::new();
        for (stage, r) in &self.per_stage {
            counts.total_processed += r.counts.total_processed;
            counts.created += r.counts.created;
            counts.updated += r.counts.updated;
            counts.skipped += r.counts.skipped;
            counts.errors += r.counts.errors;
            error_details.extend(r.error_details.iter().map(|d| format!("{stage}: {d}")));
        }
        SyncResult {
            success: self.success,
            message: self.message.clone(),
            counts,
            duration_ms: self.total_duration_ms,
            error_details,
        }
    }
}

/// Releases the vendor snapshot hold when the run ends or is dropped.
struct SnapshotHold<'a>(&'a dyn VendorCatalog);

impl<'a> SnapshotHold<'a> {
    fn acquire(vendor: &'a dyn VendorCatalog) -> Self {
        vendor.hold_snapshot(true);
        Self(vendor)
    }
}

impl Drop for SnapshotHold<'_> {
    fn drop(&mut self) {
        self.0.hold_snapshot(false);
    }
}

/// Clears the vendor cache, then runs every stage in foreign-key order.
///
/// A failing stage never stops the run; later stages work against whatever
/// local state exists and report their own record errors.
pub struct FullSyncCoordinator {
    orchestrator: Arc<SyncOrchestrator>,
}

impl FullSyncCoordinator {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn run_full_sync(&self) -> FullSyncReport {
        let started_at = Utc::now();
        let started = Instant::now();
        info!("full sync started");

        // One fresh vendor snapshot for the whole run, however long it takes.
        let vendor = self.orchestrator.vendor().as_ref();
        vendor.clear_cache();
        let hold = SnapshotHold::acquire(vendor);

        let mut per_stage = BTreeMap::new();
        for stage in SyncStage::PIPELINE {
            let outcome = self.orchestrator.run_stage(stage).await;
            if !outcome.is_success() {
                warn!(stage = %stage, "stage did not succeed; continuing with next stage");
            }
            per_stage.insert(stage, outcome.into_result(stage));
        }
        drop(hold);

        let total_duration_ms = started.elapsed().as_millis() as u64;
        let failed: Vec<&str> = per_stage
            .iter()
            .filter(|(_, r)| !r.success)
            .map(|(s, _)| s.as_str())
            .collect();
        let success = failed.is_empty();
        let message = if success {
            "Full sync completed successfully".to_string()
        } else {
            format!("Full sync completed with failures in: {}", failed.join(", "))
        };

        let report = FullSyncReport {
            success,
            message,
            per_stage,
            total_duration_ms,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            success = report.success,
            duration_ms = report.total_duration_ms,
            "full sync finished"
        );
        self.orchestrator
            .record(SyncStage::Full, &report.summary_result())
            .await;
        report
    }
}
