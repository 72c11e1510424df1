//! Entity reconcilers: map vendor records onto local catalog rows.
//!
//! Every reconciler follows the same shape. Look the record up by vendor id,
//! create it when absent, update it when a mapped field differs, skip it
//! otherwise. A failing record is counted and reported but never aborts the
//! batch; only a failure in `prepare` fails the stage.
//!
//! Precondition: categories and manufacturers are reconciled before
//! parameters, and parameters before products. Later reconcilers resolve
//! foreign keys against rows the earlier ones wrote.
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

use crate::database_ops::catalog::{LinkedId, VendorId};
use crate::sync::error::{SyncError, SyncOutcome};
use crate::sync::result::{RecordOutcome, SyncResult, SyncStage, SyncTally};

pub mod category;
pub mod manufacturer;
pub mod parameter;
pub mod product;

pub use category::CategoryReconciler;
pub use manufacturer::ManufacturerReconciler;
pub use parameter::ParameterReconciler;
pub use product::ProductReconciler;

#[async_trait]
pub trait Reconciler: Send + Sync {
    type Record: Send + Sync;
    /// Lookup state loaded once per batch.
    type Context: Send + Sync;

    fn stage(&self) -> SyncStage;

    fn record_id(record: &Self::Record) -> String;

    async fn prepare(&self) -> SyncOutcome<Self::Context>;

    async fn reconcile_one(
        &self,
        ctx: &Self::Context,
        record: &Self::Record,
    ) -> SyncOutcome<RecordOutcome>;

    async fn reconcile(&self, records: &[Self::Record]) -> SyncOutcome<SyncResult> {
        let stage = self.stage();
        let started = Instant::now();
        let ctx = self.prepare().await?;
        let mut tally = SyncTally::new();

        for record in records {
            match self.reconcile_one(&ctx, record).await {
                Ok(outcome) => tally.record(outcome),
                Err(err) => {
                    let id = Self::record_id(record);
                    let err = if matches!(err, SyncError::RecordMapping { .. }) {
                        err
                    } else {
                        SyncError::mapping(id.clone(), err.to_string())
                    };
                    warn!(stage = %stage, record = %id, error = %err, "record not reconciled");
                    tally.record_error(&err);
                }
            }
        }

        let result = tally.finish(stage, started.elapsed());
        info!(
            stage = %stage,
            total = result.counts.total_processed,
            created = result.counts.created,
            updated = result.counts.updated,
            skipped = result.counts.skipped,
            errors = result.counts.errors,
            duration_ms = result.duration_ms,
            "reconcile finished"
        );
        Ok(result)
    }
}

/// Vendor id -> local id. With duplicates the lowest local id wins,
/// matching the single-row lookups.
pub(crate) fn index_by_external_id(linked: Vec<LinkedId>) -> HashMap<VendorId, i64> {
    let mut index = HashMap::with_capacity(linked.len());
    for l in linked {
        index.entry(l.external_id).or_insert(l.id);
    }
    index
}

pub(crate) fn sorted_unique(mut ids: Vec<i64>) -> Vec<i64> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub(crate) fn require_text(vendor_id: &str, field: &str, value: &str) -> SyncOutcome<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyncError::mapping(vendor_id, format!("missing {field}")));
    }
    Ok(trimmed.to_string())
}
