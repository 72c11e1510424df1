use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::database_ops::catalog::CatalogStore;
use crate::sync::error::SyncOutcome;
use crate::sync::ledger::SyncLedger;
use crate::sync::reconcile::{
    CategoryReconciler, ManufacturerReconciler, ParameterReconciler, ProductReconciler,
    Reconciler,
};
use crate::sync::result::{StageOutcome, SyncResult, SyncStage};
use crate::sync::vendor::VendorCatalog;

/// Runs single stages: fetch from the vendor, reconcile, record in the ledger.
///
/// Each stage is independently invocable. Callers running products must
/// have synced categories, manufacturers and parameters first.
pub struct SyncOrchestrator {
    vendor: Arc<dyn VendorCatalog>,
    ledger: Arc<dyn SyncLedger>,
    categories: CategoryReconciler,
    manufacturers: ManufacturerReconciler,
    parameters: ParameterReconciler,
    products: ProductReconciler,
}

impl SyncOrchestrator {
    pub fn new(
        vendor: Arc<dyn VendorCatalog>,
        store: Arc<dyn CatalogStore>,
        ledger: Arc<dyn SyncLedger>,
    ) -> Self {
        Self {
            vendor,
            ledger,
            categories: CategoryReconciler::new(store.clone()),
            manufacturers: ManufacturerReconciler::new(store.clone()),
            parameters: ParameterReconciler::new(store.clone()),
            products: ProductReconciler::new(store),
        }
    }

    pub fn vendor(&self) -> &Arc<dyn VendorCatalog> {
        &self.vendor
    }

    pub fn ledger(&self) -> &Arc<dyn SyncLedger> {
        &self.ledger
    }

    pub async fn sync_categories(&self) -> SyncResult {
        self.run_stage(SyncStage::Categories)
            .await
            .into_result(SyncStage::Categories)
    }

    pub async fn sync_manufacturers(&self) -> SyncResult {
        self.run_stage(SyncStage::Manufacturers)
            .await
            .into_result(SyncStage::Manufacturers)
    }

    pub async fn sync_parameters(&self) -> SyncResult {
        self.run_stage(SyncStage::Parameters)
            .await
            .into_result(SyncStage::Parameters)
    }

    pub async fn sync_products(&self) -> SyncResult {
        self.run_stage(SyncStage::Products)
            .await
            .into_result(SyncStage::Products)
    }

    /// Runs one entity stage and records its result, failed or not.
    #[instrument(skip(self))]
    pub async fn run_stage(&self, stage: SyncStage) -> StageOutcome {
        info!(stage = %stage, "stage started");
        let started = Instant::now();
        let result = self.execute(stage).await;
        match &result {
            Err(e) if e.is_recoverable() => {
                warn!(stage = %stage, error = %e, "stage failed; a later run may succeed")
            }
            Err(e) => error!(stage = %stage, error = %e, "stage failed"),
            Ok(_) => {}
        }
        let outcome = StageOutcome::from_result(result, started.elapsed());
        self.record(stage, &outcome.clone().into_result(stage)).await;
        outcome
    }

    async fn execute(&self, stage: SyncStage) -> SyncOutcome<SyncResult> {
        match stage {
            SyncStage::Categories => {
                let records = self.vendor.get_categories().await?;
                self.categories.reconcile(&records).await
            }
            SyncStage::Manufacturers => {
                let records = self.vendor.get_manufacturers().await?;
                self.manufacturers.reconcile(&records).await
            }
            SyncStage::Parameters => {
                let records = self.vendor.get_parameters().await?;
                self.parameters.reconcile(&records).await
            }
            SyncStage::Products => {
                let records = self.vendor.get_all_products().await?;
                self.products.reconcile(&records).await
            }
            SyncStage::Full => Ok(SyncResult::failed(
                stage,
                "full sync is not a single stage",
                std::time::Duration::ZERO,
            )),
        }
    }

    /// Ledger failures are logged; they never change the stage result.
    pub(crate) async fn record(&self, stage: SyncStage, result: &SyncResult) {
        if let Err(e) = self.ledger.append(stage, result).await {
            error!(stage = %stage, error = %e, "failed to record sync result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{vendor_product, FakeVendor, MemoryCatalog, MemoryLedger};

    fn setup() -> (Arc<FakeVendor>, Arc<MemoryCatalog>, Arc<MemoryLedger>, SyncOrchestrator) {
        let vendor = FakeVendor::new(vec![
            vendor_product("NB-1", "E14", "Notebooks", "Lenovo", &[("CPU", "Core i5")]),
            vendor_product("MON-1", "P2422H", "Monitors", "Dell", &[]),
        ]);
        let store = MemoryCatalog::new();
        let ledger = MemoryLedger::new();
        let orchestrator = SyncOrchestrator::new(vendor.clone(), store.clone(), ledger.clone());
        (vendor, store, ledger, orchestrator)
    }

    #[tokio::test]
    async fn each_stage_is_recorded_under_its_key() {
        let (_vendor, store, ledger, orchestrator) = setup();

        assert_eq!(orchestrator.sync_categories().await.counts.created, 2);
        assert_eq!(orchestrator.sync_manufacturers().await.counts.created, 2);
        assert_eq!(orchestrator.sync_parameters().await.counts.created, 1);
        assert_eq!(orchestrator.sync_products().await.counts.created, 2);

        let keys: Vec<_> = ledger.entries().into_iter().map(|e| e.stage_key).collect();
        assert_eq!(
            keys,
            vec!["ASBIS_CATEGORIES", "ASBIS_MANUFACTURERS", "ASBIS_PARAMETERS", "ASBIS_PRODUCTS"]
        );
        assert_eq!(store.products().len(), 2);
    }

    #[tokio::test]
    async fn vendor_outage_yields_a_recorded_failed_result() {
        let (vendor, _store, ledger, orchestrator) = setup();
        vendor.set_offline(true);

        let result = orchestrator.sync_categories().await;

        assert!(!result.success);
        assert!(result.message.contains("vendor API unavailable"));
        let entries = ledger.entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].result.success);
    }

    #[tokio::test]
    async fn products_before_dependencies_report_record_errors() {
        let (_vendor, store, _ledger, orchestrator) = setup();

        let result = orchestrator.sync_products().await;

        assert!(!result.success);
        assert_eq!(result.counts.errors, 2);
        assert!(store.products().is_empty());
    }

    #[tokio::test]
    async fn stages_share_one_cached_snapshot() {
        let (vendor, _store, _ledger, orchestrator) = setup();
        orchestrator.sync_categories().await;
        vendor.set_live(vec![vendor_product("X-1", "X", "Phones", "Acme", &[])]);
        let manufacturers = orchestrator.sync_manufacturers().await;

        assert_eq!(vendor.fetches(), 1);
        assert_eq!(manufacturers.counts.created, 2);
    }
}
