//! Read-only operator views over the ledger, the local catalog and the vendor.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::database_ops::asbis::models::CategoryStatistics;
use crate::database_ops::catalog::{CatalogStore, EntityKind, LinkedId, VendorId};
use crate::sync::error::SyncOutcome;
use crate::sync::ledger::{effective_limit, SyncLedger};
use crate::sync::result::{SyncLogEntry, SyncResult, SyncStage};
use crate::sync::vendor::{CachedFeedInfo, VendorCatalog, VendorInfo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStatus {
    pub stage: SyncStage,
    pub stage_key: String,
    pub last_run: Option<SyncLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub stages: Vec<StageStatus>,
    pub last_full_sync: Option<SyncLogEntry>,
    /// Every entity stage has run at least once and its latest run succeeded.
    pub healthy: bool,
    pub never_synced: Vec<SyncStage>,
    pub cached_feeds: Vec<CachedFeedInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCount {
    pub kind: EntityKind,
    pub total: i64,
    pub linked: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorCounts {
    pub products: u64,
    pub categories: u64,
    pub manufacturers: u64,
    pub parameters: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub local: Vec<EntityCount>,
    pub vendor: Option<VendorCounts>,
    pub vendor_error: Option<String>,
    pub category_statistics: Option<CategoryStatistics>,
    pub last_results: BTreeMap<SyncStage, SyncResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInfo {
    pub reachable: bool,
    #[serde(flatten)]
    pub vendor: VendorInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    pub success: bool,
    pub message: String,
    pub product_count: Option<u64>,
    pub category_count: Option<u64>,
}

/// Local rows sharing one vendor identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub kind: EntityKind,
    pub external_id: VendorId,
    /// Owning parameter for option duplicates.
    pub scope: Option<i64>,
    pub local_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingProduct {
    pub id: i64,
    pub external_id: VendorId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub duplicates: Vec<DuplicateGroup>,
    pub missing_from_vendor: Vec<MissingProduct>,
    pub snapshot_available: bool,
    pub snapshot_error: Option<String>,
    pub is_clean: bool,
}

/// A vendor-side category or manufacturer and whether it is linked locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableItem {
    pub vendor_id: String,
    pub name: String,
    pub product_count: u64,
    pub synced: bool,
    pub local_id: Option<i64>,
}

pub struct SyncStatsService {
    vendor: Arc<dyn VendorCatalog>,
    store: Arc<dyn CatalogStore>,
    ledger: Arc<dyn SyncLedger>,
}

impl SyncStatsService {
    pub fn new(
        vendor: Arc<dyn VendorCatalog>,
        store: Arc<dyn CatalogStore>,
        ledger: Arc<dyn SyncLedger>,
    ) -> Self {
        Self {
            vendor,
            store,
            ledger,
        }
    }

    pub async fn last_sync_result(&self, stage: SyncStage) -> SyncOutcome<Option<SyncResult>> {
        Ok(self.ledger.last(stage).await?.map(|e| e.result))
    }

    /// Newest first. Missing or non-positive limits fall back to the default.
    pub async fn recent_sync_logs(&self, limit: Option<i64>) -> SyncOutcome<Vec<SyncLogEntry>> {
        self.ledger.recent(effective_limit(limit)).await
    }

    pub async fn sync_status(&self) -> SyncOutcome<SyncStatus> {
        let mut stages = Vec::with_capacity(SyncStage::PIPELINE.len());
        let mut never_synced = Vec::new();
        let mut healthy = true;
        for stage in SyncStage::PIPELINE {
            let last_run = self.ledger.last(stage).await?;
            match &last_run {
                None => {
                    never_synced.push(stage);
                    healthy = false;
                }
                Some(entry) if !entry.result.success => healthy = false,
                Some(_) => {}
            }
            stages.push(StageStatus {
                stage,
                stage_key: stage.key().to_string(),
                last_run,
            });
        }
        Ok(SyncStatus {
            stages,
            last_full_sync: self.ledger.last(SyncStage::Full).await?,
            healthy,
            never_synced,
            cached_feeds: self.vendor.info().cached_feeds,
        })
    }

    /// Local counts always; vendor counts when the vendor answers.
    pub async fn sync_stats(&self) -> SyncOutcome<SyncStats> {
        let mut local = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            local.push(EntityCount {
                kind,
                total: self.store.count(kind).await?,
                linked: self.store.linked_ids(kind).await?.len() as i64,
            });
        }

        let mut last_results = BTreeMap::new();
        for stage in SyncStage::PIPELINE {
            if let Some(entry) = self.ledger.last(stage).await? {
                last_results.insert(stage, entry.result);
            }
        }

        let (vendor, vendor_error, category_statistics) = match self.vendor_counts().await {
            Ok((counts, stats)) => (Some(counts), None, Some(stats)),
            Err(e) => {
                warn!(error = %e, "vendor counts unavailable for stats");
                (None, Some(e.to_string()), None)
            }
        };

        Ok(SyncStats {
            local,
            vendor,
            vendor_error,
            category_statistics,
            last_results,
        })
    }

    async fn vendor_counts(&self) -> SyncOutcome<(VendorCounts, CategoryStatistics)> {
        let products = self.vendor.get_all_products().await?;
        let counts = VendorCounts {
            products: products.len() as u64,
            categories: self.vendor.get_categories().await?.len() as u64,
            manufacturers: self.vendor.get_manufacturers().await?.len() as u64,
            parameters: self.vendor.get_parameters().await?.len() as u64,
        };
        Ok((counts, self.vendor.get_category_statistics().await?))
    }

    pub async fn api_info(&self) -> ApiInfo {
        ApiInfo {
            reachable: self.vendor.test_connection().await,
            vendor: self.vendor.info(),
        }
    }

    /// Reachability plus snapshot counts. Never errors.
    pub async fn test_connection(&self) -> ConnectionCheck {
        if !self.vendor.test_connection().await {
            return ConnectionCheck {
                success: false,
                message: "vendor API is not reachable".into(),
                product_count: None,
                category_count: None,
            };
        }
        match self.vendor.get_category_statistics().await {
            Ok(stats) => ConnectionCheck {
                success: true,
                message: "vendor API is reachable".into(),
                product_count: Some(stats.total_products),
                category_count: Some(stats.total_categories),
            },
            Err(e) => ConnectionCheck {
                success: false,
                message: e.to_string(),
                product_count: None,
                category_count: None,
            },
        }
    }

    /// Flags duplicate vendor ids and linked products absent from the vendor
    /// snapshot. Nothing is corrected.
    pub async fn check_data_integrity(&self) -> SyncOutcome<IntegrityReport> {
        let mut duplicates = Vec::new();
        for kind in EntityKind::ALL {
            duplicates.extend(duplicate_groups(kind, self.store.linked_ids(kind).await?));
        }

        let (missing_from_vendor, snapshot_available, snapshot_error) =
            match self.vendor.get_all_products().await {
                Ok(snapshot) => {
                    let codes: HashSet<&str> = snapshot.iter().map(|p| p.code.as_str()).collect();
                    let missing = self
                        .store
                        .linked_ids(EntityKind::Product)
                        .await?
                        .into_iter()
                        .filter(|l| !codes.contains(l.external_id.as_str()))
                        .map(|l| MissingProduct {
                            id: l.id,
                            external_id: l.external_id,
                        })
                        .collect::<Vec<_>>();
                    (missing, true, None)
                }
                Err(e) => {
                    warn!(error = %e, "integrity check without vendor snapshot");
                    (Vec::new(), false, Some(e.to_string()))
                }
            };

        debug!(
            duplicates = duplicates.len(),
            missing = missing_from_vendor.len(),
            "integrity check finished"
        );
        let is_clean = duplicates.is_empty() && missing_from_vendor.is_empty();
        Ok(IntegrityReport {
            duplicates,
            missing_from_vendor,
            snapshot_available,
            snapshot_error,
            is_clean,
        })
    }

    pub async fn available_categories(&self) -> SyncOutcome<Vec<AvailableItem>> {
        let local = first_ids(self.store.linked_ids(EntityKind::Category).await?);
        Ok(self
            .vendor
            .get_categories()
            .await?
            .into_iter()
            .map(|c| annotate(&local, c.vendor_id, c.name, c.product_count))
            .collect())
    }

    pub async fn available_manufacturers(&self) -> SyncOutcome<Vec<AvailableItem>> {
        let local = first_ids(self.store.linked_ids(EntityKind::Manufacturer).await?);
        Ok(self
            .vendor
            .get_manufacturers()
            .await?
            .into_iter()
            .map(|m| annotate(&local, m.vendor_id, m.name, m.product_count))
            .collect())
    }
}

fn duplicate_groups(kind: EntityKind, ids: Vec<LinkedId>) -> Vec<DuplicateGroup> {
    let mut groups: BTreeMap<(Option<i64>, String), Vec<i64>> = BTreeMap::new();
    for l in ids {
        groups
            .entry((l.scope, l.external_id.as_str().to_string()))
            .or_default()
            .push(l.id);
    }
    groups
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((scope, external_id), mut local_ids)| {
            local_ids.sort_unstable();
            DuplicateGroup {
                kind,
                external_id: VendorId::new(external_id),
                scope,
                local_ids,
            }
        })
        .collect()
}

fn first_ids(ids: Vec<LinkedId>) -> HashMap<String, i64> {
    let mut out: HashMap<String, i64> = HashMap::new();
    for l in ids {
        let entry = out.entry(l.external_id.as_str().to_string()).or_insert(l.id);
        *entry = (*entry).min(l.id);
    }
    out
}

fn annotate(local: &HashMap<String, i64>, vendor_id: String, name: String, product_count: u64) -> AvailableItem {
    let local_id = local.get(&vendor_id).copied();
    AvailableItem {
        vendor_id,
        name,
        product_count,
        synced: local_id.is_some(),
        local_id,
    }
}
