use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::tags;

/// Stock assigned to a new product when the payload leaves it out
pub const DEFAULT_STOCK: i32 = 10;

/// Prices are stored as NUMERIC(10,2)
pub const PRICE_SCALE: u32 = 2;
const PRICE_PRECISION: u32 = 10;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Store-generated product identifier
    ProductId
);
id_type!(CategoryId);
id_type!(TagId);
id_type!(ProductTagId);

/// Core product structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub product_name: String,
    pub price: Decimal,
    pub stock: i32,
    pub category_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub category_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub tag_name: String,
}

/// A stored row of the product/tag associative table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTag {
    pub id: ProductTagId,
    pub product_id: ProductId,
    pub tag_id: TagId,
}

/// Product together with its category and tags, as served by the read endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
}

/// Product-related errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl CatalogError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Body of a create request. Every field is optional at the wire level so a
/// missing field is reported by `validate` rather than as a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductInput {
    pub product_name: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub category_id: Option<CategoryId>,
    #[serde(rename = "tagIds", default)]
    pub tag_ids: Option<Vec<TagId>>,
}

/// Validated create request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub product_name: String,
    pub price: Decimal,
    pub stock: i32,
    pub category_id: Option<CategoryId>,
    /// Deduplicated; empty when the payload carried no `tagIds`.
    pub tag_ids: Vec<TagId>,
}

impl ProductInput {
    pub fn validate(self) -> Result<NewProduct, CatalogError> {
        let product_name = validate_name(self.product_name.ok_or(CatalogError::MissingField("product_name"))?)?;
        let price = validate_price(self.price.ok_or(CatalogError::MissingField("price"))?)?;
        let stock = validate_stock(self.stock.unwrap_or(DEFAULT_STOCK))?;

        Ok(NewProduct {
            product_name,
            price,
            stock,
            category_id: self.category_id,
            tag_ids: self
                .tag_ids
                .map(|ids| tags::dedup_tag_ids(&ids))
                .unwrap_or_default(),
        })
    }
}

/// Body of an update request. Absent fields are left unchanged; an explicit
/// `"category_id": null` detaches the product from its category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub product_name: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    #[serde(default, deserialize_with = "present")]
    pub category_id: Option<Option<CategoryId>>,
    #[serde(rename = "tagIds", default)]
    pub tag_ids: Option<Vec<TagId>>,
}

/// Column changes for a product row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductChanges {
    pub product_name: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub category_id: Option<Option<CategoryId>>,
}

impl ProductChanges {
    pub fn is_empty(&self) -> bool {
        self.product_name.is_none()
            && self.price.is_none()
            && self.stock.is_none()
            && self.category_id.is_none()
    }

    /// Applies the changes to an in-memory row.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.product_name {
            product.product_name = name.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category_id) = self.category_id {
            product.category_id = category_id;
        }
    }
}

/// Validated update request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductUpdate {
    pub changes: ProductChanges,
    /// `None` means the caller asked for no tag changes.
    pub tag_ids: Option<Vec<TagId>>,
}

impl ProductPatch {
    pub fn validate(self) -> Result<ProductUpdate, CatalogError> {
        let changes = ProductChanges {
            product_name: self.product_name.map(validate_name).transpose()?,
            price: self.price.map(validate_price).transpose()?,
            stock: self.stock.map(validate_stock).transpose()?,
            category_id: self.category_id,
        };

        Ok(ProductUpdate {
            changes,
            tag_ids: self.tag_ids.map(|ids| tags::dedup_tag_ids(&ids)),
        })
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn validate_name(name: String) -> Result<String, CatalogError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::invalid("product_name", "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn validate_price(price: Decimal) -> Result<Decimal, CatalogError> {
    if price < Decimal::ZERO {
        return Err(CatalogError::invalid("price", "must not be negative"));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(CatalogError::invalid(
            "price",
            format!("must have at most {} decimal places", PRICE_SCALE),
        ));
    }
    let max = Decimal::new(10_i64.pow(PRICE_PRECISION) - 1, PRICE_SCALE);
    if price > max {
        return Err(CatalogError::invalid("price", format!("must not exceed {}", max)));
    }
    Ok(price)
}

fn validate_stock(stock: i32) -> Result<i32, CatalogError> {
    if stock < 0 {
        return Err(CatalogError::invalid("stock", "must not be negative"));
    }
    Ok(stock)
}
