//! Catalogue products.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use appejv_core::ProductId;

use super::{clean, required};
use crate::store::Row;

/// A product that has not been soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub code: String,
    pub name: String,
    pub unit: Option<String>,
    pub stock: i64,
    pub price: Decimal,
    pub category: Option<String>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub specifications: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `POST /products` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductRequest {
    pub code: String,
    pub name: String,
    pub unit: Option<String>,
    #[serde(default)]
    pub stock: i64,
    pub price: Decimal,
    pub category: Option<String>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub specifications: Option<String>,
    pub image_url: Option<String>,
}

impl CreateProductRequest {
    /// Validate and convert into a row for insertion.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending field.
    pub fn into_row(self) -> Result<Row, String> {
        let code = required("code", &self.code)?;
        let name = required("name", &self.name)?;
        if self.stock < 0 {
            return Err("stock must not be negative".to_string());
        }
        if self.price.is_sign_negative() {
            return Err("price must not be negative".to_string());
        }

        Ok(crate::store::row([
            ("code", json!(code)),
            ("name", json!(name)),
            ("unit", json!(clean(self.unit))),
            ("stock", json!(self.stock)),
            ("price", json!(self.price)),
            ("category", json!(clean(self.category))),
            ("category_id", json!(self.category_id)),
            ("description", json!(clean(self.description))),
            ("specifications", json!(clean(self.specifications))),
            ("image_url", json!(clean(self.image_url))),
        ]))
    }
}

/// `PUT /products/{id}` body; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub stock: Option<i64>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub specifications: Option<String>,
    pub image_url: Option<String>,
}

impl UpdateProductRequest {
    /// Validate and convert into a patch.
    ///
    /// # Errors
    ///
    /// Returns a message if a field is invalid or nothing would change.
    pub fn into_patch(self) -> Result<Row, String> {
        let mut patch = Row::new();

        if let Some(name) = self.name {
            patch.insert("name".into(), json!(required("name", &name)?));
        }
        if let Some(stock) = self.stock {
            if stock < 0 {
                return Err("stock must not be negative".to_string());
            }
            patch.insert("stock".into(), json!(stock));
        }
        if let Some(price) = self.price {
            if price.is_sign_negative() {
                return Err("price must not be negative".to_string());
            }
            patch.insert("price".into(), json!(price));
        }
        if let Some(category_id) = self.category_id {
            patch.insert("category_id".into(), json!(category_id));
        }
        for (column, value) in [
            ("unit", self.unit),
            ("category", self.category),
            ("description", self.description),
            ("specifications", self.specifications),
            ("image_url", self.image_url),
        ] {
            if value.is_some() {
                patch.insert(column.into(), json!(clean(value)));
            }
        }

        if patch.is_empty() {
            return Err("no fields to update".to_string());
        }
        Ok(patch)
    }
}

/// `POST /inventory/adjust` body. `quantity` is a signed delta.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryAdjustRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub reason: Option<String>,
}
