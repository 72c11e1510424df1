use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::database_ops::asbis::models::{normalize_key, VendorProduct};
use crate::database_ops::catalog::{CatalogStore, EntityKind, ProductFields, VendorId};
use crate::sync::error::{SyncError, SyncOutcome};
use crate::sync::reconcile::{index_by_external_id, require_text, sorted_unique, Reconciler};
use crate::sync::result::{RecordOutcome, SyncStage};

pub struct ProductReconciler {
    store: Arc<dyn CatalogStore>,
}

/// Foreign-key lookups loaded once per batch.
pub struct ProductContext {
    categories: HashMap<VendorId, i64>,
    manufacturers: HashMap<VendorId, i64>,
    parameters: HashMap<VendorId, i64>,
    options: HashMap<(i64, VendorId), i64>,
}

impl ProductReconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

impl ProductContext {
    fn map_fields(&self, record: &VendorProduct) -> SyncOutcome<ProductFields> {
        let code = record.code.as_str();
        let name = require_text(code, "name", record.name.as_deref().unwrap_or_default())?;

        let category_key = record
            .category_key()
            .ok_or_else(|| SyncError::mapping(code, "missing category"))?;
        let category_id = *self
            .categories
            .get(&VendorId::new(category_key.as_str()))
            .ok_or_else(|| SyncError::mapping(code, format!("unknown category {category_key}")))?;

        let manufacturer_id = match record.manufacturer_key() {
            None => None,
            Some(key) => Some(
                *self
                    .manufacturers
                    .get(&VendorId::new(key.as_str()))
                    .ok_or_else(|| SyncError::mapping(code, format!("unknown manufacturer {key}")))?,
            ),
        };

        let mut option_ids = Vec::with_capacity(record.specifications.len());
        for (param_name, value) in &record.specifications {
            let (Some(param_key), Some(option_key)) = (normalize_key(param_name), normalize_key(value)) else {
                continue;
            };
            let parameter_id = *self
                .parameters
                .get(&VendorId::new(param_key.as_str()))
                .ok_or_else(|| SyncError::mapping(code, format!("unknown parameter {param_key}")))?;
            let option_id = *self
                .options
                .get(&(parameter_id, VendorId::new(option_key.as_str())))
                .ok_or_else(|| {
                    SyncError::mapping(code, format!("unknown option {option_key} for parameter {param_key}"))
                })?;
            option_ids.push(option_id);
        }

        Ok(ProductFields {
            name,
            product_type: record.product_type.clone(),
            category_id,
            manufacturer_id,
            price: record.price.clone(),
            retail_price: record.retail_price.clone(),
            currency: record.currency.clone(),
            stock: record.stock,
            images: record.images.clone(),
            option_ids: sorted_unique(option_ids),
        })
    }
}

#[async_trait]
impl Reconciler for ProductReconciler {
    type Record = VendorProduct;
    type Context = ProductContext;

    fn stage(&self) -> SyncStage {
        SyncStage::Products
    }

    fn record_id(record: &VendorProduct) -> String {
        if record.code.is_empty() {
            format!("<no code: {}>", record.name.as_deref().unwrap_or("unnamed"))
        } else {
            record.code.clone()
        }
    }

    async fn prepare(&self) -> SyncOutcome<ProductContext> {
        let categories = index_by_external_id(self.store.linked_ids(EntityKind::Category).await?);
        let manufacturers =
            index_by_external_id(self.store.linked_ids(EntityKind::Manufacturer).await?);
        let parameters = index_by_external_id(self.store.linked_ids(EntityKind::Parameter).await?);
        let mut options = HashMap::new();
        for o in self.store.linked_ids(EntityKind::ParameterOption).await? {
            if let Some(parameter_id) = o.scope {
                options.entry((parameter_id, o.external_id)).or_insert(o.id);
            }
        }
        Ok(ProductContext {
            categories,
            manufacturers,
            parameters,
            options,
        })
    }

    async fn reconcile_one(
        &self,
        ctx: &ProductContext,
        record: &VendorProduct,
    ) -> SyncOutcome<RecordOutcome> {
        let vendor_id = VendorId::new(require_text(&Self::record_id(record), "product code", &record.code)?);
        let mut fields = ctx.map_fields(record)?;

        match self.store.find_product(&vendor_id).await? {
            None => {
                self.store.insert_product(&vendor_id, &fields).await?;
                Ok(RecordOutcome::Created)
            }
            Some(existing) => {
                // No price feed entry means "leave price and stock alone".
                if record.price.is_none() && record.stock.is_none() {
                    fields.price = existing.fields.price.clone();
                    fields.retail_price = existing.fields.retail_price.clone();
                    fields.currency = existing.fields.currency.clone();
                    fields.stock = existing.fields.stock;
                }
                if existing.fields == fields {
                    Ok(RecordOutcome::Skipped)
                } else {
                    self.store.update_product(existing.id, &fields).await?;
                    Ok(RecordOutcome::Updated)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::reconcile::{
        CategoryReconciler, ManufacturerReconciler, ParameterReconciler,
    };
    use crate::database_ops::asbis::models::{
        derive_categories, derive_manufacturers, derive_parameters,
    };
    use crate::testing::{vendor_product, Curation, MemoryCatalog};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    async fn seed_dependencies(store: &Arc<MemoryCatalog>, products: &[VendorProduct]) {
        CategoryReconciler::new(store.clone())
            .reconcile(&derive_categories(products))
            .await
            .unwrap();
        ManufacturerReconciler::new(store.clone())
            .reconcile(&derive_manufacturers(products))
            .await
            .unwrap();
        ParameterReconciler::new(store.clone())
            .reconcile(&derive_parameters(products))
            .await
            .unwrap();
    }

    fn feed() -> Vec<VendorProduct> {
        vec![
            vendor_product("NB-1", "E14", "Notebooks", "Lenovo", &[("CPU", "Core i5"), ("RAM", "16 GB")]),
            vendor_product("NB-2", "E16", "Notebooks", "Lenovo", &[("CPU", "Core i7")]),
            vendor_product("MON-1", "P2422H", "Monitors", "Dell", &[]),
        ]
    }

    #[tokio::test]
    async fn creates_products_with_resolved_foreign_keys() {
        let store = MemoryCatalog::new();
        let products = feed();
        seed_dependencies(&store, &products).await;

        let result = ProductReconciler::new(store.clone())
            .reconcile(&products)
            .await
            .unwrap();

        assert_eq!(result.counts.created, 3);
        assert_eq!(result.counts.errors, 0);
        let stored = store.products();
        let nb1 = stored
            .iter()
            .find(|p| p.external_id == Some(VendorId::from("NB-1")))
            .unwrap();
        assert_eq!(nb1.fields.option_ids.len(), 2);
        assert!(nb1.fields.manufacturer_id.is_some());
    }

    #[tokio::test]
    async fn one_malformed_record_does_not_abort_the_batch() {
        let store = MemoryCatalog::new();
        let mut products = feed();
        seed_dependencies(&store, &products).await;
        products.push(VendorProduct {
            code: String::new(),
            name: Some("Mystery box".into()),
            ..VendorProduct::default()
        });

        let result = ProductReconciler::new(store.clone())
            .reconcile(&products)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.counts.errors, 1);
        assert_eq!(result.counts.created, 3);
        assert_eq!(result.counts.total_processed, 4);
        assert!(result.error_details[0].contains("missing product code"));
    }

    #[tokio::test]
    async fn unknown_category_is_a_mapping_error_not_a_null_category() {
        let store = MemoryCatalog::new();
        let products = feed();
        seed_dependencies(&store, &products).await;
        let stray = vendor_product("TAB-1", "Tab M10", "Tablets", "Lenovo", &[]);

        let result = ProductReconciler::new(store.clone())
            .reconcile(&[stray])
            .await
            .unwrap();

        assert_eq!(result.counts.errors, 1);
        assert_eq!(result.error_details, vec!["record TAB-1: unknown category tablets".to_string()]);
        assert!(store.products().is_empty());
    }

    #[tokio::test]
    async fn unknown_parameter_option_is_a_mapping_error() {
        let store = MemoryCatalog::new();
        let products = feed();
        seed_dependencies(&store, &products).await;
        let odd = vendor_product("NB-9", "E14 Gen 9", "Notebooks", "Lenovo", &[("CPU", "Core Ultra 9")]);

        let result = ProductReconciler::new(store.clone())
            .reconcile(&[odd])
            .await
            .unwrap();

        assert_eq!(result.counts.errors, 1);
        assert!(result.error_details[0].contains("unknown option core ultra 9 for parameter cpu"));
    }

    #[tokio::test]
    async fn rerun_skips_and_price_change_updates() {
        let store = MemoryCatalog::new();
        let mut products = feed();
        seed_dependencies(&store, &products).await;
        let reconciler = ProductReconciler::new(store.clone());
        reconciler.reconcile(&products).await.unwrap();

        let again = reconciler.reconcile(&products).await.unwrap();
        assert_eq!(again.counts.created, 0);
        assert_eq!(again.counts.skipped, again.counts.total_processed);

        products[2].price = Some(BigDecimal::from_str("149.99").unwrap());
        products[2].stock = Some(4);
        let changed = reconciler.reconcile(&products).await.unwrap();
        assert_eq!(changed.counts.updated, 1);
        assert_eq!(changed.counts.skipped, 2);
    }

    #[tokio::test]
    async fn missing_price_feed_keeps_stored_price() {
        let store = MemoryCatalog::new();
        let mut products = feed();
        products[0].price = Some(BigDecimal::from_str("500").unwrap());
        products[0].stock = Some(7);
        seed_dependencies(&store, &products).await;
        let reconciler = ProductReconciler::new(store.clone());
        reconciler.reconcile(&products).await.unwrap();

        products[0].price = None;
        products[0].stock = None;
        let result = reconciler.reconcile(&products).await.unwrap();
        assert_eq!(result.counts.skipped, 3);

        let nb1 = store
            .products()
            .into_iter()
            .find(|p| p.external_id == Some(VendorId::from("NB-1")))
            .unwrap();
        assert_eq!(nb1.fields.price, Some(BigDecimal::from_str("500").unwrap()));
        assert_eq!(nb1.fields.stock, Some(7));
    }

    #[tokio::test]
    async fn curation_fields_survive_updates() {
        let store = MemoryCatalog::new();
        let mut products = feed();
        seed_dependencies(&store, &products).await;
        let reconciler = ProductReconciler::new(store.clone());
        reconciler.reconcile(&products).await.unwrap();

        let id = store.products()[0].id;
        let curated = Curation {
            manual_discount: Some(BigDecimal::from_str("12.5").unwrap()),
            is_featured: true,
        };
        store.set_curation(id, curated.clone());

        products[0].name = Some("E14 Gen 6".into());
        let result = reconciler.reconcile(&products).await.unwrap();
        assert_eq!(result.counts.updated, 1);
        assert_eq!(store.curation(id), Some(curated));
    }
}
