use async_trait::async_trait;
use std::sync::Arc;

use crate::database_ops::asbis::models::VendorManufacturer;
use crate::database_ops::catalog::{CatalogStore, ManufacturerFields, VendorId};
use crate::sync::error::SyncOutcome;
use crate::sync::reconcile::{require_text, Reconciler};
use crate::sync::result::{RecordOutcome, SyncStage};

pub struct ManufacturerReconciler {
    store: Arc<dyn CatalogStore>,
}

impl ManufacturerReconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Reconciler for ManufacturerReconciler {
    type Record = VendorManufacturer;
    type Context = ();

    fn stage(&self) -> SyncStage {
        SyncStage::Manufacturers
    }

    fn record_id(record: &VendorManufacturer) -> String {
        record.vendor_id.clone()
    }

    async fn prepare(&self) -> SyncOutcome<()> {
        Ok(())
    }

    async fn reconcile_one(
        &self,
        _ctx: &(),
        record: &VendorManufacturer,
    ) -> SyncOutcome<RecordOutcome> {
        let vendor_id = VendorId::new(require_text(&record.vendor_id, "vendor id", &record.vendor_id)?);
        let fields = ManufacturerFields {
            name: require_text(&record.vendor_id, "name", &record.name)?,
        };

        match self.store.find_manufacturer(&vendor_id).await? {
            None => {
                self.store.insert_manufacturer(&vendor_id, &fields).await?;
                Ok(RecordOutcome::Created)
            }
            Some(existing) if existing.fields != fields => {
                self.store.update_manufacturer(existing.id, &fields).await?;
                Ok(RecordOutcome::Updated)
            }
            Some(_) => Ok(RecordOutcome::Skipped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::catalog::EntityKind;
    use crate::testing::MemoryCatalog;

    fn manufacturer(id: &str, name: &str) -> VendorManufacturer {
        VendorManufacturer {
            vendor_id: id.into(),
            name: name.into(),
            product_count: 3,
        }
    }

    #[tokio::test]
    async fn links_by_vendor_id_only() {
        let store = MemoryCatalog::new();
        // Same display name but no vendor link: not a match.
        store.seed_manufacturer(None, "Lenovo");
        let reconciler = ManufacturerReconciler::new(store.clone());

        let result = reconciler
            .reconcile(&[manufacturer("lenovo", "Lenovo")])
            .await
            .unwrap();

        assert_eq!(result.counts.created, 1);
        assert_eq!(store.manufacturers().len(), 2);
    }

    #[tokio::test]
    async fn storage_failures_are_counted_per_record() {
        let store = MemoryCatalog::new();
        store.fail_writes(EntityKind::Manufacturer);
        let reconciler = ManufacturerReconciler::new(store.clone());

        let result = reconciler
            .reconcile(&[manufacturer("dell", "Dell"), manufacturer("hp", "HP")])
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.counts.errors, 2);
        assert_eq!(
            result.error_details[0],
            "record dell: catalog storage error: manufacturers unavailable"
        );
    }
}
