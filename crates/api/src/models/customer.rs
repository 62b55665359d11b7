//! Customers managed by sales staff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use appejv_core::CustomerId;

use super::{clean, required};
use crate::store::Row;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Customer {
    pub id: CustomerId,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    /// Subject id of the sales agent looking after this customer.
    pub assigned_sale: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomerRequest {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub assigned_sale: Option<String>,
}

impl CreateCustomerRequest {
    /// # Errors
    ///
    /// Returns a message when `code` or `name` is blank.
    pub fn into_row(self) -> Result<Row, String> {
        Ok(crate::store::row([
            ("code", json!(required("code", &self.code)?)),
            ("name", json!(required("name", &self.name)?)),
            ("address", json!(clean(self.address))),
            ("phone", json!(clean(self.phone))),
            ("assigned_sale", json!(clean(self.assigned_sale))),
        ]))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub assigned_sale: Option<String>,
}

impl UpdateCustomerRequest {
    /// # Errors
    ///
    /// Returns a message if `name` is blank or nothing would change.
    pub fn into_patch(self) -> Result<Row, String> {
        let mut patch = Row::new();
        if let Some(name) = self.name {
            patch.insert("name".into(), json!(required("name", &name)?));
        }
        for (column, value) in [
            ("address", self.address),
            ("phone", self.phone),
            ("assigned_sale", self.assigned_sale),
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
