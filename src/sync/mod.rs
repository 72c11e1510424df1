//! Vendor catalog synchronization: stages, results, ledger and views.
pub mod cache;
pub mod error;
pub mod full_sync;
pub mod ledger;
pub mod orchestrator;
pub mod reconcile;
pub mod result;
pub mod stats;
pub mod vendor;

pub use error::{SyncError, SyncOutcome};
pub use full_sync::{FullSyncCoordinator, FullSyncReport};
pub use orchestrator::SyncOrchestrator;
pub use result::{StageOutcome, SyncLogEntry, SyncResult, SyncStage};
pub use stats::SyncStatsService;
pub use vendor::VendorCatalog;
