//! Local catalog entities as seen by the sync engine, and the storage seam
//! the reconcilers write through.
//!
//! Only vendor-sourced columns are modelled here. Curation columns on
//! `products` (`manual_discount`, `is_featured`) are never selected or written
//! by this module, so a sync cannot clobber them.
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::fmt;

use crate::database_ops::db::Db;
use crate::sync::error::SyncOutcome;

/// Identifier of a record on the vendor side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(String);

impl VendorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VendorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Manufacturer,
    Parameter,
    ParameterOption,
    Product,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Category,
        EntityKind::Manufacturer,
        EntityKind::Parameter,
        EntityKind::ParameterOption,
        EntityKind::Product,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Category => "categories",
            EntityKind::Manufacturer => "manufacturers",
            EntityKind::Parameter => "parameters",
            EntityKind::ParameterOption => "parameter_options",
            EntityKind::Product => "products",
        }
    }
}

/// A local row; `external_id` is `None` for entities created outside the sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntity<F> {
    pub id: i64,
    pub external_id: Option<VendorId>,
    pub fields: F,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFields {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerFields {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterFields {
    pub name: String,
    /// Sorted, deduplicated local category ids.
    pub category_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterOption {
    pub id: i64,
    pub parameter_id: i64,
    pub external_id: Option<VendorId>,
    pub value: String,
}

/// Vendor-sourced product columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductFields {
    pub name: String,
    pub product_type: Option<String>,
    pub category_id: i64,
    pub manufacturer_id: Option<i64>,
    pub price: Option<BigDecimal>,
    pub retail_price: Option<BigDecimal>,
    pub currency: Option<String>,
    pub stock: Option<i32>,
    pub images: Vec<String>,
    /// Sorted, deduplicated parameter option ids.
    pub option_ids: Vec<i64>,
}

pub type Category = LocalEntity<CategoryFields>;
pub type Manufacturer = LocalEntity<ManufacturerFields>;
pub type Parameter = LocalEntity<ParameterFields>;
pub type Product = LocalEntity<ProductFields>;

/// `(id, external_id)` of a vendor-linked row. `scope` is the owning
/// parameter for options and `None` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedId {
    pub id: i64,
    pub external_id: VendorId,
    pub scope: Option<i64>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_category(&self, external_id: &VendorId) -> SyncOutcome<Option<Category>>;
    async fn insert_category(&self, external_id: &VendorId, fields: &CategoryFields) -> SyncOutcome<i64>;
    async fn update_category(&self, id: i64, fields: &CategoryFields) -> SyncOutcome<()>;

    async fn find_manufacturer(&self, external_id: &VendorId) -> SyncOutcome<Option<Manufacturer>>;
    async fn insert_manufacturer(
        &self,
        external_id: &VendorId,
        fields: &ManufacturerFields,
    ) -> SyncOutcome<i64>;
    async fn update_manufacturer(&self, id: i64, fields: &ManufacturerFields) -> SyncOutcome<()>;

    async fn find_parameter(&self, external_id: &VendorId) -> SyncOutcome<Option<Parameter>>;
    async fn insert_parameter(&self, external_id: &VendorId, fields: &ParameterFields) -> SyncOutcome<i64>;
    async fn update_parameter(&self, id: i64, fields: &ParameterFields) -> SyncOutcome<()>;

    async fn parameter_options(&self, parameter_id: i64) -> SyncOutcome<Vec<ParameterOption>>;
    async fn insert_parameter_option(
        &self,
        parameter_id: i64,
        external_id: &VendorId,
        value: &str,
    ) -> SyncOutcome<i64>;
    async fn update_parameter_option(&self, id: i64, value: &str) -> SyncOutcome<()>;

    async fn find_product(&self, external_id: &VendorId) -> SyncOutcome<Option<Product>>;
    async fn insert_product(&self, external_id: &VendorId, fields: &ProductFields) -> SyncOutcome<i64>;
    async fn update_product(&self, id: i64, fields: &ProductFields) -> SyncOutcome<()>;

    /// Every row of `kind` that carries an external id, ordered by id.
    async fn linked_ids(&self, kind: EntityKind) -> SyncOutcome<Vec<LinkedId>>;

    async fn count(&self, kind: EntityKind) -> SyncOutcome<i64>;
}

/// Postgres-backed catalog.
#[derive(Clone)]
pub struct PgCatalogStore {
    db: Db,
}

impl PgCatalogStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    fn external_id(row: &PgRow) -> Option<VendorId> {
        row.try_get::<Option<String>, _>("external_id")
            .ok()
            .flatten()
            .map(VendorId)
    }

    async fn find_named(&self, table: &str, external_id: &VendorId) -> SyncOutcome<Option<(i64, Option<VendorId>, String)>> {
        // Lowest id wins when duplicates exist; the integrity check reports them.
        let sql = format!(
            "SELECT id, external_id, name FROM {table} WHERE external_id = $1 ORDER BY id LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(external_id.as_str())
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row.map(|r| (r.get("id"), Self::external_id(&r), r.get("name"))))
    }

    async fn insert_named(&self, table: &str, external_id: &VendorId, name: &str) -> SyncOutcome<i64> {
        let sql = format!(
            "INSERT INTO {table} (external_id, name, created_at, updated_at) VALUES ($1, $2, now(), now()) RETURNING id"
        );
        let id: i64 = sqlx::query_scalar(&sql)
            .persistent(false)
            .bind(external_id.as_str())
            .bind(name)
            .fetch_one(&self.db.pool)
            .await?;
        Ok(id)
    }

    async fn update_named(&self, table: &str, id: i64, name: &str) -> SyncOutcome<()> {
        let sql = format!("UPDATE {table} SET name = $2, updated_at = now() WHERE id = $1");
        sqlx::query(&sql)
            .persistent(false)
            .bind(id)
            .bind(name)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn find_category(&self, external_id: &VendorId) -> SyncOutcome<Option<Category>> {
        Ok(self
            .find_named("categories", external_id)
            .await?
            .map(|(id, external_id, name)| LocalEntity {
                id,
                external_id,
                fields: CategoryFields { name },
            }))
    }

    async fn insert_category(&self, external_id: &VendorId, fields: &CategoryFields) -> SyncOutcome<i64> {
        self.insert_named("categories", external_id, &fields.name).await
    }

    async fn update_category(&self, id: i64, fields: &CategoryFields) -> SyncOutcome<()> {
        self.update_named("categories", id, &fields.name).await
    }

    async fn find_manufacturer(&self, external_id: &VendorId) -> SyncOutcome<Option<Manufacturer>> {
        Ok(self
            .find_named("manufacturers", external_id)
            .await?
            .map(|(id, external_id, name)| LocalEntity {
                id,
                external_id,
                fields: ManufacturerFields { name },
            }))
    }

    async fn insert_manufacturer(
        &self,
        external_id: &VendorId,
        fields: &ManufacturerFields,
    ) -> SyncOutcome<i64> {
        self.insert_named("manufacturers", external_id, &fields.name).await
    }

    async fn update_manufacturer(&self, id: i64, fields: &ManufacturerFields) -> SyncOutcome<()> {
        self.update_named("manufacturers", id, &fields.name).await
    }

    async fn find_parameter(&self, external_id: &VendorId) -> SyncOutcome<Option<Parameter>> {
        let row = sqlx::query(
            "SELECT p.id, p.external_id, p.name,
                    ARRAY(SELECT pc.category_id FROM parameter_categories pc
                          WHERE pc.parameter_id = p.id ORDER BY pc.category_id) AS category_ids
             FROM parameters p WHERE p.external_id = $1 ORDER BY p.id LIMIT 1",
        )
        .persistent(false)
        .bind(external_id.as_str())
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row.map(|r| LocalEntity {
            id: r.get("id"),
            external_id: Self::external_id(&r),
            fields: ParameterFields {
                name: r.get("name"),
                category_ids: r.get("category_ids"),
            },
        }))
    }

    async fn insert_parameter(&self, external_id: &VendorId, fields: &ParameterFields) -> SyncOutcome<i64> {
        let mut tx = self.db.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO parameters (external_id, name, created_at, updated_at)
             VALUES ($1, $2, now(), now()) RETURNING id",
        )
        .persistent(false)
        .bind(external_id.as_str())
        .bind(&fields.name)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO parameter_categories (parameter_id, category_id)
             SELECT $1, unnest($2::bigint[]) ON CONFLICT DO NOTHING",
        )
        .persistent(false)
        .bind(id)
        .bind(&fields.category_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn update_parameter(&self, id: i64, fields: &ParameterFields) -> SyncOutcome<()> {
        let mut tx = self.db.pool.begin().await?;
        sqlx::query("UPDATE parameters SET name = $2, updated_at = now() WHERE id = $1")
            .persistent(false)
            .bind(id)
            .bind(&fields.name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM parameter_categories WHERE parameter_id = $1")
            .persistent(false)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO parameter_categories (parameter_id, category_id)
             SELECT $1, unnest($2::bigint[]) ON CONFLICT DO NOTHING",
        )
        .persistent(false)
        .bind(id)
        .bind(&fields.category_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn parameter_options(&self, parameter_id: i64) -> SyncOutcome<Vec<ParameterOption>> {
        let rows = sqlx::query(
            "SELECT id, parameter_id, external_id, value FROM parameter_options
             WHERE parameter_id = $1 ORDER BY id",
        )
        .persistent(false)
        .bind(parameter_id)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| ParameterOption {
                id: r.get("id"),
                parameter_id: r.get("parameter_id"),
                external_id: Self::external_id(r),
                value: r.get("value"),
            })
            .collect())
    }

    async fn insert_parameter_option(
        &self,
        parameter_id: i64,
        external_id: &VendorId,
        value: &str,
    ) -> SyncOutcome<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO parameter_options (parameter_id, external_id, value, created_at, updated_at)
             VALUES ($1, $2, $3, now(), now()) RETURNING id",
        )
        .persistent(false)
        .bind(parameter_id)
        .bind(external_id.as_str())
        .bind(value)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(id)
    }

    async fn update_parameter_option(&self, id: i64, value: &str) -> SyncOutcome<()> {
        sqlx::query("UPDATE parameter_options SET value = $2, updated_at = now() WHERE id = $1")
            .persistent(false)
            .bind(id)
            .bind(value)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    async fn find_product(&self, external_id: &VendorId) -> SyncOutcome<Option<Product>> {
        let row = sqlx::query(
            "SELECT p.id, p.external_id, p.name, p.product_type, p.category_id, p.manufacturer_id,
                    p.price, p.retail_price, p.currency, p.stock, p.images,
                    ARRAY(SELECT o.option_id FROM product_parameter_options o
                          WHERE o.product_id = p.id ORDER BY o.option_id) AS option_ids
             FROM products p WHERE p.external_id = $1 ORDER BY p.id LIMIT 1",
        )
        .persistent(false)
        .bind(external_id.as_str())
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row.map(|r| LocalEntity {
            id: r.get("id"),
            external_id: Self::external_id(&r),
            fields: ProductFields {
                name: r.get("name"),
                product_type: r.get("product_type"),
                category_id: r.get("category_id"),
                manufacturer_id: r.get("manufacturer_id"),
                price: r.get("price"),
                retail_price: r.get("retail_price"),
                currency: r.get("currency"),
                stock: r.get("stock"),
                images: r.get("images"),
                option_ids: r.get("option_ids"),
            },
        }))
    }

    async fn insert_product(&self, external_id: &VendorId, fields: &ProductFields) -> SyncOutcome<i64> {
        let mut tx = self.db.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO products (external_id, name, product_type, category_id, manufacturer_id,
                                   price, retail_price, currency, stock, images, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now(), now()) RETURNING id",
        )
        .persistent(false)
        .bind(external_id.as_str())
        .bind(&fields.name)
        .bind(&fields.product_type)
        .bind(fields.category_id)
        .bind(fields.manufacturer_id)
        .bind(&fields.price)
        .bind(&fields.retail_price)
        .bind(&fields.currency)
        .bind(fields.stock)
        .bind(&fields.images)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO product_parameter_options (product_id, option_id)
             SELECT $1, unnest($2::bigint[]) ON CONFLICT DO NOTHING",
        )
        .persistent(false)
        .bind(id)
        .bind(&fields.option_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn update_product(&self, id: i64, fields: &ProductFields) -> SyncOutcome<()> {
        let mut tx = self.db.pool.begin().await?;
        sqlx::query(
            "UPDATE products SET name = $2, product_type = $3, category_id = $4, manufacturer_id = $5,
                    price = $6, retail_price = $7, currency = $8, stock = $9, images = $10,
                    updated_at = now()
             WHERE id = $1",
        )
        .persistent(false)
        .bind(id)
        .bind(&fields.name)
        .bind(&fields.product_type)
        .bind(fields.category_id)
        .bind(fields.manufacturer_id)
        .bind(&fields.price)
        .bind(&fields.retail_price)
        .bind(&fields.currency)
        .bind(fields.stock)
        .bind(&fields.images)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM product_parameter_options WHERE product_id = $1")
            .persistent(false)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO product_parameter_options (product_id, option_id)
             SELECT $1, unnest($2::bigint[]) ON CONFLICT DO NOTHING",
        )
        .persistent(false)
        .bind(id)
        .bind(&fields.option_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn linked_ids(&self, kind: EntityKind) -> SyncOutcome<Vec<LinkedId>> {
        let scope = match kind {
            EntityKind::ParameterOption => "parameter_id",
            _ => "NULL::bigint",
        };
        let sql = format!(
            "SELECT id, external_id, {scope} AS scope FROM {} WHERE external_id IS NOT NULL ORDER BY id",
            kind.table()
        );
        let rows = sqlx::query(&sql)
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| LinkedId {
                id: r.get("id"),
                external_id: VendorId(r.get("external_id")),
                scope: r.get("scope"),
            })
            .collect())
    }

    async fn count(&self, kind: EntityKind) -> SyncOutcome<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let n: i64 = sqlx::query_scalar(&sql)
            .persistent(false)
            .fetch_one(&self.db.pool)
            .await?;
        Ok(n)
    }
}
