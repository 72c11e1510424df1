// Shared handler state

use crate::database_ops::catalog::CatalogStore;
use crate::database_ops::db::Db;
use crate::sync::full_sync::FullSyncCoordinator;
use crate::sync::ledger::SyncLedger;
use crate::sync::orchestrator::SyncOrchestrator;
use crate::sync::stats::SyncStatsService;
use crate::sync::vendor::VendorCatalog;
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub coordinator: FullSyncCoordinator,
    pub stats: SyncStatsService,
    /// Checked by `/health` when present.
    pub db: Option<Db>,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        vendor: Arc<dyn VendorCatalog>,
        store: Arc<dyn CatalogStore>,
        ledger: Arc<dyn SyncLedger>,
        db: Option<Db>,
    ) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::new(
            vendor.clone(),
            store.clone(),
            ledger.clone(),
        ));
        Self {
            coordinator: FullSyncCoordinator::new(orchestrator.clone()),
            stats: SyncStatsService::new(vendor, store, ledger),
            orchestrator,
            db,
            started: Instant::now(),
        }
    }
}
