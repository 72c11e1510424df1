use async_trait::async_trait;
use std::sync::Arc;

use crate::database_ops::asbis::models::VendorCategory;
use crate::database_ops::catalog::{CatalogStore, CategoryFields, VendorId};
use crate::sync::error::SyncOutcome;
use crate::sync::reconcile::{require_text, Reconciler};
use crate::sync::result::{RecordOutcome, SyncStage};

pub struct CategoryReconciler {
    store: Arc<dyn CatalogStore>,
}

impl CategoryReconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Reconciler for CategoryReconciler {
    type Record = VendorCategory;
    type Context = ();

    fn stage(&self) -> SyncStage {
        SyncStage::Categories
    }

    fn record_id(record: &VendorCategory) -> String {
        record.vendor_id.clone()
    }

    async fn prepare(&self) -> SyncOutcome<()> {
        Ok(())
    }

    async fn reconcile_one(&self, _ctx: &(), record: &VendorCategory) -> SyncOutcome<RecordOutcome> {
        let vendor_id = VendorId::new(require_text(&record.vendor_id, "vendor id", &record.vendor_id)?);
        let fields = CategoryFields {
            name: require_text(&record.vendor_id, "name", &record.name)?,
        };

        match self.store.find_category(&vendor_id).await? {
            None => {
                self.store.insert_category(&vendor_id, &fields).await?;
                Ok(RecordOutcome::Created)
            }
            Some(existing) if existing.fields != fields => {
                self.store.update_category(existing.id, &fields).await?;
                Ok(RecordOutcome::Updated)
            }
            Some(_) => Ok(RecordOutcome::Skipped),
        }
    }
}
