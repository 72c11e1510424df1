use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::database_ops::asbis::models::VendorParameter;
use crate::database_ops::catalog::{CatalogStore, EntityKind, ParameterFields, VendorId};
use crate::sync::error::{SyncError, SyncOutcome};
use crate::sync::reconcile::{index_by_external_id, require_text, sorted_unique, Reconciler};
use crate::sync::result::{RecordOutcome, SyncStage};

/// Reconciles parameters, their options, and the categories they apply to.
pub struct ParameterReconciler {
    store: Arc<dyn CatalogStore>,
}

pub struct ParameterContext {
    categories: HashMap<VendorId, i64>,
}

impl ParameterReconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Inserts missing options and rewrites changed display values.
    /// Returns true when anything was written.
    async fn reconcile_options(&self, parameter_id: i64, record: &VendorParameter) -> SyncOutcome<bool> {
        let existing: HashMap<VendorId, (i64, String)> = self
            .store
            .parameter_options(parameter_id)
            .await?
            .into_iter()
            .filter_map(|o| Some((o.external_id?, (o.id, o.value))))
            .collect();

        let mut changed = false;
        for (option_key, value) in &record.options {
            let option_id = VendorId::new(option_key.as_str());
            match existing.get(&option_id) {
                None => {
                    self.store
                        .insert_parameter_option(parameter_id, &option_id, value)
                        .await?;
                    changed = true;
                }
                Some((id, current)) if current != value => {
                    self.store.update_parameter_option(*id, value).await?;
                    changed = true;
                }
                Some(_) => {}
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl Reconciler for ParameterReconciler {
    type Record = VendorParameter;
    type Context = ParameterContext;

    fn stage(&self) -> SyncStage {
        SyncStage::Parameters
    }

    fn record_id(record: &VendorParameter) -> String {
        record.vendor_id.clone()
    }

    async fn prepare(&self) -> SyncOutcome<ParameterContext> {
        let categories = index_by_external_id(self.store.linked_ids(EntityKind::Category).await?);
        Ok(ParameterContext { categories })
    }

    async fn reconcile_one(
        &self,
        ctx: &ParameterContext,
        record: &VendorParameter,
    ) -> SyncOutcome<RecordOutcome> {
        let vendor_id = VendorId::new(require_text(&record.vendor_id, "vendor id", &record.vendor_id)?);
        let name = require_text(&record.vendor_id, "name", &record.name)?;

        let mut category_ids = Vec::with_capacity(record.category_ids.len());
        for key in &record.category_ids {
            let id = ctx
                .categories
                .get(&VendorId::new(key.as_str()))
                .ok_or_else(|| SyncError::mapping(&record.vendor_id, format!("unknown category {key}")))?;
            category_ids.push(*id);
        }
        let fields = ParameterFields {
            name,
            category_ids: sorted_unique(category_ids),
        };

        let (parameter_id, outcome) = match self.store.find_parameter(&vendor_id).await? {
            None => (
                self.store.insert_parameter(&vendor_id, &fields).await?,
                RecordOutcome::Created,
            ),
            Some(existing) if existing.fields != fields => {
                self.store.update_parameter(existing.id, &fields).await?;
                (existing.id, RecordOutcome::Updated)
            }
            Some(existing) => (existing.id, RecordOutcome::Skipped),
        };

        let options_changed = self.reconcile_options(parameter_id, record).await?;
        Ok(match outcome {
            RecordOutcome::Skipped if options_changed => RecordOutcome::Updated,
            other => other,
        })
    }
}
