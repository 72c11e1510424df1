//! In-memory doubles for the storage and vendor seams.
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::database_ops::asbis::models::{
    derive_categories, derive_manufacturers, derive_parameters, VendorCategory,
    VendorManufacturer, VendorParameter, VendorProduct,
};
use crate::database_ops::catalog::{
    CatalogStore, Category, CategoryFields, EntityKind, LinkedId, LocalEntity, Manufacturer,
    ManufacturerFields, Parameter, ParameterFields, ParameterOption, Product, ProductFields,
    VendorId,
};
use crate::sync::error::{SyncError, SyncOutcome};
use crate::sync::ledger::SyncLedger;
use crate::sync::result::{SyncLogEntry, SyncResult, SyncStage};
use crate::sync::vendor::{VendorCatalog, VendorInfo};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Curation {
    pub manual_discount: Option<BigDecimal>,
    pub is_featured: bool,
}

#[derive(Default)]
struct CatalogState {
    next_id: i64,
    categories: Vec<Category>,
    manufacturers: Vec<Manufacturer>,
    parameters: Vec<Parameter>,
    options: Vec<ParameterOption>,
    products: Vec<Product>,
    curation: HashMap<i64, Curation>,
    writes: u64,
}

impl CatalogState {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.writes += 1;
        self.next_id
    }
}

fn find<F: Clone>(rows: &[LocalEntity<F>], external_id: &VendorId) -> Option<LocalEntity<F>> {
    rows.iter()
        .filter(|r| r.external_id.as_ref() == Some(external_id))
        .min_by_key(|r| r.id)
        .cloned()
}

fn update<F: Clone>(rows: &mut [LocalEntity<F>], id: i64, fields: &F) -> SyncOutcome<()> {
    let row = rows
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| SyncError::Storage(format!("row {id} not found")))?;
    row.fields = fields.clone();
    Ok(())
}

fn linked<F>(rows: &[LocalEntity<F>]) -> Vec<LinkedId> {
    rows.iter()
        .filter_map(|r| {
            Some(LinkedId {
                id: r.id,
                external_id: r.external_id.clone()?,
                scope: None,
            })
        })
        .collect()
}

#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
    failing: Mutex<HashSet<EntityKind>>,
}

impl MemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every write to `kind` fail with a storage error.
    pub fn fail_writes(&self, kind: EntityKind) {
        self.failing.lock().unwrap().insert(kind);
    }

    fn check(&self, kind: EntityKind) -> SyncOutcome<()> {
        if self.failing.lock().unwrap().contains(&kind) {
            return Err(SyncError::Storage(format!("{} unavailable", kind.table())));
        }
        Ok(())
    }

    pub fn writes(&self) -> u64 {
        self.state.lock().unwrap().writes
    }

    pub fn seed_category(&self, external_id: Option<&str>, name: &str) -> i64 {
        let mut s = self.state.lock().unwrap();
        let id = s.next();
        s.categories.push(LocalEntity {
            id,
            external_id: external_id.map(VendorId::from),
            fields: CategoryFields { name: name.into() },
        });
        id
    }

    pub fn seed_manufacturer(&self, external_id: Option<&str>, name: &str) -> i64 {
        let mut s = self.state.lock().unwrap();
        let id = s.next();
        s.manufacturers.push(LocalEntity {
            id,
            external_id: external_id.map(VendorId::from),
            fields: ManufacturerFields { name: name.into() },
        });
        id
    }

    pub fn seed_product(&self, external_id: Option<&str>, fields: ProductFields) -> i64 {
        let mut s = self.state.lock().unwrap();
        let id = s.next();
        s.products.push(LocalEntity {
            id,
            external_id: external_id.map(VendorId::from),
            fields,
        });
        s.curation.insert(id, Curation::default());
        id
    }

    pub fn set_curation(&self, product_id: i64, curation: Curation) {
        self.state.lock().unwrap().curation.insert(product_id, curation);
    }

    pub fn curation(&self, product_id: i64) -> Option<Curation> {
        self.state.lock().unwrap().curation.get(&product_id).cloned()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.state.lock().unwrap().categories.clone()
    }

    pub fn manufacturers(&self) -> Vec<Manufacturer> {
        self.state.lock().unwrap().manufacturers.clone()
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        self.state.lock().unwrap().parameters.clone()
    }

    pub fn options(&self) -> Vec<ParameterOption> {
        self.state.lock().unwrap().options.clone()
    }

    pub fn products(&self) -> Vec<Product> {
        self.state.lock().unwrap().products.clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_category(&self, external_id: &VendorId) -> SyncOutcome<Option<Category>> {
        Ok(find(&self.state.lock().unwrap().categories, external_id))
    }

    async fn insert_category(&self, external_id: &VendorId, fields: &CategoryFields) -> SyncOutcome<i64> {
        self.check(EntityKind::Category)?;
        let mut s = self.state.lock().unwrap();
        let id = s.next();
        s.categories.push(LocalEntity {
            id,
            external_id: Some(external_id.clone()),
            fields: fields.clone(),
        });
        Ok(id)
    }

    async fn update_category(&self, id: i64, fields: &CategoryFields) -> SyncOutcome<()> {
        self.check(EntityKind::Category)?;
        let mut s = self.state.lock().unwrap();
        s.writes += 1;
        update(&mut s.categories, id, fields)
    }

    async fn find_manufacturer(&self, external_id: &VendorId) -> SyncOutcome<Option<Manufacturer>> {
        Ok(find(&self.state.lock().unwrap().manufacturers, external_id))
    }

    async fn insert_manufacturer(
        &self,
        external_id: &VendorId,
        fields: &ManufacturerFields,
    ) -> SyncOutcome<i64> {
        self.check(EntityKind::Manufacturer)?;
        let mut s = self.state.lock().unwrap();
        let id = s.next();
        s.manufacturers.push(LocalEntity {
            id,
            external_id: Some(external_id.clone()),
            fields: fields.clone(),
        });
        Ok(id)
    }

    async fn update_manufacturer(&self, id: i64, fields: &ManufacturerFields) -> SyncOutcome<()> {
        self.check(EntityKind::Manufacturer)?;
        let mut s = self.state.lock().unwrap();
        s.writes += 1;
        update(&mut s.manufacturers, id, fields)
    }

    async fn find_parameter(&self, external_id: &VendorId) -> SyncOutcome<Option<Parameter>> {
        Ok(find(&self.state.lock().unwrap().parameters, external_id))
    }

    async fn insert_parameter(&self, external_id: &VendorId, fields: &ParameterFields) -> SyncOutcome<i64> {
        self.check(EntityKind::Parameter)?;
        let mut s = self.state.lock().unwrap();
        let id = s.next();
        s.parameters.push(LocalEntity {
            id,
            external_id: Some(external_id.clone()),
            fields: fields.clone(),
        });
        Ok(id)
    }

    async fn update_parameter(&self, id: i64, fields: &ParameterFields) -> SyncOutcome<()> {
        self.check(EntityKind::Parameter)?;
        let mut s = self.state.lock().unwrap();
        s.writes += 1;
        update(&mut s.parameters, id, fields)
    }

    async fn parameter_options(&self, parameter_id: i64) -> SyncOutcome<Vec<ParameterOption>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .options
            .iter()
            .filter(|o| o.parameter_id == parameter_id)
            .cloned()
            .collect())
    }

    async fn insert_parameter_option(
        &self,
        parameter_id: i64,
        external_id: &VendorId,
        value: &str,
    ) -> SyncOutcome<i64> {
        self.check(EntityKind::ParameterOption)?;
        let mut s = self.state.lock().unwrap();
        let id = s.next();
        s.options.push(ParameterOption {
            id,
            parameter_id,
            external_id: Some(external_id.clone()),
            value: value.to_string(),
        });
        Ok(id)
    }

    async fn update_parameter_option(&self, id: i64, value: &str) -> SyncOutcome<()> {
        self.check(EntityKind::ParameterOption)?;
        let mut s = self.state.lock().unwrap();
        s.writes += 1;
        let option = s
            .options
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| SyncError::Storage(format!("option {id} not found")))?;
        option.value = value.to_string();
        Ok(())
    }

    async fn find_product(&self, external_id: &VendorId) -> SyncOutcome<Option<Product>> {
        Ok(find(&self.state.lock().unwrap().products, external_id))
    }

    async fn insert_product(&self, external_id: &VendorId, fields: &ProductFields) -> SyncOutcome<i64> {
        self.check(EntityKind::Product)?;
        let mut s = self.state.lock().unwrap();
        let id = s.next();
        s.products.push(LocalEntity {
            id,
            external_id: Some(external_id.clone()),
            fields: fields.clone(),
        });
        s.curation.insert(id, Curation::default());
        Ok(id)
    }

    async fn update_product(&self, id: i64, fields: &ProductFields) -> SyncOutcome<()> {
        self.check(EntityKind::Product)?;
        let mut s = self.state.lock().unwrap();
        s.writes += 1;
        update(&mut s.products, id, fields)
    }

    async fn linked_ids(&self, kind: EntityKind) -> SyncOutcome<Vec<LinkedId>> {
        let s = self.state.lock().unwrap();
        let mut ids = match kind {
            EntityKind::Category => linked(&s.categories),
            EntityKind::Manufacturer => linked(&s.manufacturers),
            EntityKind::Parameter => linked(&s.parameters),
            EntityKind::Product => linked(&s.products),
            EntityKind::ParameterOption => s
                .options
                .iter()
                .filter_map(|o| {
                    Some(LinkedId {
                        id: o.id,
                        external_id: o.external_id.clone()?,
                        scope: Some(o.parameter_id),
                    })
                })
                .collect(),
        };
        ids.sort_by_key(|l| l.id);
        Ok(ids)
    }

    async fn count(&self, kind: EntityKind) -> SyncOutcome<i64> {
        let s = self.state.lock().unwrap();
        let n = match kind {
            EntityKind::Category => s.categories.len(),
            EntityKind::Manufacturer => s.manufacturers.len(),
            EntityKind::Parameter => s.parameters.len(),
            EntityKind::ParameterOption => s.options.len(),
            EntityKind::Product => s.products.len(),
        };
        Ok(n as i64)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<SyncLogEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<SyncLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncLedger for MemoryLedger {
    async fn append(&self, stage: SyncStage, result: &SyncResult) -> SyncOutcome<SyncLogEntry> {
        let mut entries = self.entries.lock().unwrap();
        let entry = SyncLogEntry {
            id: entries.len() as i64 + 1,
            stage_key: stage.key().to_string(),
            result: result.clone(),
            created_at: Utc::now(),
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn last(&self, stage: SyncStage) -> SyncOutcome<Option<SyncLogEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.stage_key == stage.key())
            .cloned())
    }

    async fn recent(&self, limit: usize) -> SyncOutcome<Vec<SyncLogEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Vendor double with a snapshot cache, a fetch counter and per-stage faults.
#[derive(Default)]
pub struct FakeVendor {
    live: Mutex<Vec<VendorProduct>>,
    snapshot: Mutex<Option<Arc<Vec<VendorProduct>>>>,
    fetches: AtomicU64,
    offline: Mutex<bool>,
    failing: Mutex<HashSet<SyncStage>>,
    held: Mutex<bool>,
    expire_each_read: Mutex<bool>,
}

impl FakeVendor {
    pub fn new(products: Vec<VendorProduct>) -> Arc<Self> {
        let v = Self::default();
        *v.live.lock().unwrap() = products;
        Arc::new(v)
    }

    /// Replace what the vendor would return on the next network fetch.
    pub fn set_live(&self, products: Vec<VendorProduct>) {
        *self.live.lock().unwrap() = products;
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn fail_stage(&self, stage: SyncStage) {
        self.failing.lock().unwrap().insert(stage);
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Behave as if the cache TTL elapses after every read.
    pub fn expire_between_reads(&self) {
        *self.expire_each_read.lock().unwrap() = true;
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap()
    }

    fn snapshot(&self) -> SyncOutcome<Arc<Vec<VendorProduct>>> {
        if let Some(s) = self.snapshot.lock().unwrap().clone() {
            return Ok(s);
        }
        if *self.offline.lock().unwrap() {
            return Err(SyncError::unavailable("connection refused"));
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(self.live.lock().unwrap().clone());
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn check(&self, stage: SyncStage) -> SyncOutcome<()> {
        if self.failing.lock().unwrap().contains(&stage) {
            return Err(SyncError::payload(format!("{stage} feed is corrupt")));
        }
        Ok(())
    }
}

#[async_trait]
impl VendorCatalog for FakeVendor {
    async fn test_connection(&self) -> bool {
        !*self.offline.lock().unwrap()
    }

    async fn get_all_products(&self) -> SyncOutcome<Arc<Vec<VendorProduct>>> {
        let snapshot = self.snapshot();
        if *self.expire_each_read.lock().unwrap() && !self.is_held() {
            *self.snapshot.lock().unwrap() = None;
        }
        snapshot
    }

    async fn get_raw_product_list_xml(&self) -> SyncOutcome<Arc<String>> {
        let products = self.get_all_products().await?;
        Ok(Arc::new(format!("<ProductCatalog count=\"{}\"/>", products.len())))
    }

    fn clear_cache(&self) {
        *self.snapshot.lock().unwrap() = None;
    }

    fn hold_snapshot(&self, held: bool) {
        *self.held.lock().unwrap() = held;
    }

    fn info(&self) -> VendorInfo {
        VendorInfo {
            vendor: "fake".into(),
            base_url: "memory://vendor".into(),
            product_list_url: "memory://vendor/products".into(),
            price_list_url: None,
            timeout_secs: 1,
            cache_ttl_secs: 60,
            credentials_configured: false,
            network_fetches: self.fetches(),
            cached_feeds: Vec::new(),
        }
    }

    async fn get_categories(&self) -> SyncOutcome<Vec<VendorCategory>> {
        self.check(SyncStage::Categories)?;
        Ok(derive_categories(&self.get_all_products().await?))
    }

    async fn get_manufacturers(&self) -> SyncOutcome<Vec<VendorManufacturer>> {
        self.check(SyncStage::Manufacturers)?;
        Ok(derive_manufacturers(&self.get_all_products().await?))
    }

    async fn get_parameters(&self) -> SyncOutcome<Vec<VendorParameter>> {
        self.check(SyncStage::Parameters)?;
        Ok(derive_parameters(&self.get_all_products().await?))
    }
}

/// Shorthand for a vendor product with category, manufacturer and specs.
pub fn vendor_product(
    code: &str,
    name: &str,
    category: &str,
    manufacturer: &str,
    specs: &[(&str, &str)],
) -> VendorProduct {
    VendorProduct {
        code: code.into(),
        name: Some(name.into()),
        category_name: Some(category.into()),
        manufacturer_name: Some(manufacturer.into()),
        specifications: specs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..VendorProduct::default()
    }
}
