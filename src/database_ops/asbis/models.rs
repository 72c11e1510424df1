//! Asbis feed decoding and the vendor records derived from it.
//!
//! The product list is the only authoritative feed. Categories,
//! manufacturers and parameters are projections of one product snapshot, so
//! every stage of a run sees the same vendor state.
use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use crate::sync::error::{SyncError, SyncOutcome};

#[derive(Debug, Default, Deserialize)]
struct ProductCatalogXml {
    #[serde(rename = "Product", default)]
    products: Vec<ProductXml>,
}

#[derive(Debug, Default, Deserialize)]
struct ProductXml {
    #[serde(rename = "ProductCode", default)]
    code: Option<String>,
    #[serde(rename = "Vendor", default)]
    vendor: Option<String>,
    #[serde(rename = "ProductCategory", default)]
    category: Option<String>,
    #[serde(rename = "ProductType", default)]
    product_type: Option<String>,
    #[serde(rename = "ProductDescription", default)]
    description: Option<String>,
    #[serde(rename = "Images", default)]
    images: Option<ImagesXml>,
    #[serde(rename = "AttrList", default)]
    attributes: Option<AttrListXml>,
}

#[derive(Debug, Default, Deserialize)]
struct ImagesXml {
    #[serde(rename = "Image", default)]
    images: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AttrListXml {
    #[serde(rename = "element", default)]
    elements: Vec<AttrXml>,
}

#[derive(Debug, Default, Deserialize)]
struct AttrXml {
    #[serde(rename = "@Name", default)]
    name: Option<String>,
    #[serde(rename = "@Value", default)]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceListXml {
    #[serde(rename = "PRICE", default)]
    prices: Vec<PriceXml>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceXml {
    #[serde(rename = "WIC", default)]
    code: Option<String>,
    #[serde(rename = "MY_PRICE", default)]
    price: Option<String>,
    #[serde(rename = "RETAIL_PRICE", default)]
    retail_price: Option<String>,
    #[serde(rename = "AVAIL", default)]
    avail: Option<String>,
    #[serde(rename = "CURRENCY_CODE", default)]
    currency: Option<String>,
}

/// One product as published by the vendor. Immutable snapshot per fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorProduct {
    /// Vendor identifier (`ProductCode`). Empty when the feed omitted it.
    pub code: String,
    pub name: Option<String>,
    pub product_type: Option<String>,
    pub category_name: Option<String>,
    pub manufacturer_name: Option<String>,
    /// `None` means the price feed said nothing about this product.
    pub price: Option<BigDecimal>,
    pub retail_price: Option<BigDecimal>,
    pub currency: Option<String>,
    pub stock: Option<i32>,
    pub images: Vec<String>,
    /// Attribute display name -> value, as published.
    pub specifications: BTreeMap<String, String>,
}

impl VendorProduct {
    pub fn category_key(&self) -> Option<String> {
        self.category_name.as_deref().and_then(normalize_key)
    }

    pub fn manufacturer_key(&self) -> Option<String> {
        self.manufacturer_name.as_deref().and_then(normalize_key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub price: Option<BigDecimal>,
    pub retail_price: Option<BigDecimal>,
    pub currency: Option<String>,
    pub stock: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorCategory {
    pub vendor_id: String,
    pub name: String,
    pub product_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorManufacturer {
    pub vendor_id: String,
    pub name: String,
    pub product_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorParameter {
    pub vendor_id: String,
    pub name: String,
    /// Option vendor id -> display value.
    pub options: BTreeMap<String, String>,
    /// Category vendor ids whose products carry this parameter.
    pub category_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub vendor_id: String,
    pub name: String,
    pub product_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStatistics {
    pub total_products: u64,
    pub total_categories: u64,
    pub uncategorized_products: u64,
    pub breakdown: Vec<CategoryBreakdown>,
}

/// Vendor identity key: trimmed, lowercased, inner whitespace collapsed.
/// `None` for blank input.
pub fn normalize_key(raw: &str) -> Option<String> {
    let key = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    (!key.is_empty()).then_some(key)
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Money columns are `NUMERIC(14, 2)`, so prices are rounded to cents here.
fn parse_decimal(raw: Option<String>) -> Option<BigDecimal> {
    let raw = clean(raw)?;
    BigDecimal::from_str(&raw.replace(',', ".").replace(' ', ""))
        .ok()
        .map(|d| d.with_scale_round(2, RoundingMode::HalfUp))
}

/// Availability comes as "12", "10+", ">50" or "0".
fn parse_stock(raw: Option<String>) -> Option<i32> {
    let raw = clean(raw)?;
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

pub fn parse_product_list(xml: &str) -> SyncOutcome<Vec<VendorProduct>> {
    let catalog: ProductCatalogXml = quick_xml::de::from_str(xml)
        .map_err(|e| SyncError::payload(format!("product list: {e}")))?;

    Ok(catalog
        .products
        .into_iter()
        .map(|p| {
            let specifications = p
                .attributes
                .map(|a| a.elements)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|attr| Some((clean(attr.name)?, clean(attr.value)?)))
                .collect();
            VendorProduct {
                code: clean(p.code).unwrap_or_default(),
                name: clean(p.description),
                product_type: clean(p.product_type),
                category_name: clean(p.category),
                manufacturer_name: clean(p.vendor),
                images: p
                    .images
                    .map(|i| i.images)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|u| clean(Some(u)))
                    .collect(),
                specifications,
                ..VendorProduct::default()
            }
        })
        .collect())
}

pub fn parse_price_list(xml: &str) -> SyncOutcome<HashMap<String, PriceEntry>> {
    let list: PriceListXml = quick_xml::de::from_str(xml)
        .map_err(|e| SyncError::payload(format!("price list: {e}")))?;

    Ok(list
        .prices
        .into_iter()
        .filter_map(|p| {
            let code = clean(p.code)?;
            Some((
                code,
                PriceEntry {
                    price: parse_decimal(p.price),
                    retail_price: parse_decimal(p.retail_price),
                    currency: clean(p.currency),
                    stock: parse_stock(p.avail),
                },
            ))
        })
        .collect())
}

pub fn apply_prices(products: &mut [VendorProduct], prices: &HashMap<String, PriceEntry>) {
    for product in products.iter_mut() {
        if let Some(entry) = prices.get(&product.code) {
            product.price = entry.price.clone();
            product.retail_price = entry.retail_price.clone();
            product.currency = entry.currency.clone();
            product.stock = entry.stock;
        }
    }
}

pub fn derive_categories(products: &[VendorProduct]) -> Vec<VendorCategory> {
    let mut by_key: BTreeMap<String, VendorCategory> = BTreeMap::new();
    for p in products {
        let (Some(key), Some(name)) = (p.category_key(), p.category_name.as_ref()) else {
            continue;
        };
        by_key
            .entry(key.clone())
            .or_insert_with(|| VendorCategory {
                vendor_id: key,
                name: name.clone(),
                product_count: 0,
            })
            .product_count += 1;
    }
    by_key.into_values().collect()
}

pub fn derive_manufacturers(products: &[VendorProduct]) -> Vec<VendorManufacturer> {
    let mut by_key: BTreeMap<String, VendorManufacturer> = BTreeMap::new();
    for p in products {
        let (Some(key), Some(name)) = (p.manufacturer_key(), p.manufacturer_name.as_ref()) else {
            continue;
        };
        by_key
            .entry(key.clone())
            .or_insert_with(|| VendorManufacturer {
                vendor_id: key,
                name: name.clone(),
                product_count: 0,
            })
            .product_count += 1;
    }
    by_key.into_values().collect()
}

pub fn derive_parameters(products: &[VendorProduct]) -> Vec<VendorParameter> {
    let mut by_key: BTreeMap<String, VendorParameter> = BTreeMap::new();
    for p in products {
        let category = p.category_key();
        for (name, value) in &p.specifications {
            let (Some(key), Some(option_key)) = (normalize_key(name), normalize_key(value)) else {
                continue;
            };
            let param = by_key.entry(key.clone()).or_insert_with(|| VendorParameter {
                vendor_id: key,
                name: name.clone(),
                options: BTreeMap::new(),
                category_ids: BTreeSet::new(),
            });
            param.options.entry(option_key).or_insert_with(|| value.clone());
            if let Some(c) = &category {
                param.category_ids.insert(c.clone());
            }
        }
    }
    by_key.into_values().collect()
}

pub fn category_statistics(products: &[VendorProduct]) -> CategoryStatistics {
    let mut breakdown: Vec<CategoryBreakdown> = derive_categories(products)
        .into_iter()
        .map(|c| CategoryBreakdown {
            vendor_id: c.vendor_id,
            name: c.name,
            product_count: c.product_count,
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.product_count
            .cmp(&a.product_count)
            .then_with(|| a.vendor_id.cmp(&b.vendor_id))
    });
    let categorized: u64 = breakdown.iter().map(|b| b.product_count).sum();
    CategoryStatistics {
        total_products: products.len() as u64,
        total_categories: breakdown.len() as u64,
        uncategorized_products: products.len() as u64 - categorized,
        breakdown,
    }
}
