use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::database_ops::asbis::models::{
    category_statistics, derive_categories, derive_manufacturers, derive_parameters,
    CategoryStatistics, VendorCategory, VendorManufacturer, VendorParameter, VendorProduct,
};
use crate::sync::error::SyncOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFeedInfo {
    pub key: String,
    pub age_secs: u64,
    pub expires_in_secs: u64,
}

/// Configuration and cache summary of a vendor source, for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorInfo {
    pub vendor: String,
    pub base_url: String,
    pub product_list_url: String,
    pub price_list_url: Option<String>,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub credentials_configured: bool,
    pub network_fetches: u64,
    pub cached_feeds: Vec<CachedFeedInfo>,
}

/// Read side of an external product catalog.
///
/// Implementors memoize their payloads for a bounded window so that every
/// stage of one run observes the same snapshot. Derived listings default to
/// projections of `get_all_products`.
#[async_trait]
pub trait VendorCatalog: Send + Sync {
    /// Reachability check. Never errors; network failures yield `false`.
    async fn test_connection(&self) -> bool;

    async fn get_all_products(&self) -> SyncOutcome<Arc<Vec<VendorProduct>>>;

    /// Unparsed product feed, for diagnostics.
    async fn get_raw_product_list_xml(&self) -> SyncOutcome<Arc<String>>;

    fn clear_cache(&self);

    /// Keeps cached payloads alive past their TTL while `held` is set, so a
    /// long run keeps reading the snapshot it started with.
    fn hold_snapshot(&self, _held: bool) {}

    fn info(&self) -> VendorInfo;

    async fn get_categories(&self) -> SyncOutcome<Vec<VendorCategory>> {
        Ok(derive_categories(&self.get_all_products().await?))
    }

    async fn get_manufacturers(&self) -> SyncOutcome<Vec<VendorManufacturer>> {
        Ok(derive_manufacturers(&self.get_all_products().await?))
    }

    async fn get_parameters(&self) -> SyncOutcome<Vec<VendorParameter>> {
        Ok(derive_parameters(&self.get_all_products().await?))
    }

    async fn extract_manufacturers(&self) -> SyncOutcome<BTreeSet<String>> {
        Ok(self
            .get_manufacturers()
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect())
    }

    async fn get_category_statistics(&self) -> SyncOutcome<CategoryStatistics> {
        Ok(category_statistics(&self.get_all_products().await?))
    }
}
