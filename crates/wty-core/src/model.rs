//! Domain records exchanged with the backend.
//!
//! Field names follow the backend's camelCase JSON. Public (unauthenticated)
//! responses embed trimmed-down product and shop objects, so their
//! identifiers default when absent.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{BatchId, CodeId, ProductId, ShopId};

/// A single serialized warranty unit as listed inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Code {
    #[serde(rename = "_id")]
    pub id: CodeId,
    pub serial_number: String,
    pub product_id: ProductId,
    pub batch_id: BatchId,
    #[serde(default)]
    pub assigned_shop_id: Option<ShopId>,
    #[serde(default)]
    pub is_activated: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub activation_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_address: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl Code {
    pub fn is_assigned(&self) -> bool {
        self.assigned_shop_id.is_some()
    }
}

/// Codes generated together for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    #[serde(rename = "_id")]
    pub id: BatchId,
    pub product_id: ProductId,
    pub count: u32,
    #[serde(default)]
    pub activated_count: u32,
    #[serde(default)]
    pub assigned_count: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Batch {
    /// Counters never exceed the batch size.
    pub fn is_consistent(&self) -> bool {
        self.activated_count <= self.count && self.assigned_count <= self.count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub product_id: ProductId,
    pub product_name: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image_url: String,
    /// Warranty length in days.
    #[serde(default)]
    pub warranty_duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    #[serde(default)]
    pub shop_id: ShopId,
    pub shop_name: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Code fields as returned by the public lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDetails {
    pub serial_number: String,
    #[serde(default)]
    pub product_id: ProductId,
    #[serde(default)]
    pub assigned_shop_id: Option<ShopId>,
    #[serde(default)]
    pub is_activated: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub activation_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_address: Option<String>,
}

/// Everything the public lookup returns for one serial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRecord {
    #[serde(rename = "qrcode")]
    pub code: CodeDetails,
    pub product: Product,
    #[serde(default)]
    pub shop: Option<Shop>,
}

impl CodeRecord {
    pub fn has_customer(&self) -> bool {
        self.code.customer_name.is_some()
            || self.code.customer_phone.is_some()
            || self.code.customer_address.is_some()
    }
}

/// Optional customer fields recorded on activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(rename = "customerName", default)]
    pub name: String,
    #[serde(rename = "customerPhone", default)]
    pub phone: String,
    #[serde(rename = "customerAddress", default)]
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_shops: u64,
    pub total_products: u64,
    #[serde(rename = "totalQRCodes")]
    pub total_codes: u64,
    #[serde(rename = "activatedQRCodes")]
    pub activated_codes: u64,
    pub today_activations: u64,
    #[serde(default)]
    pub top_products: Vec<TopProduct>,
    #[serde(default)]
    pub weekly_activations: Vec<DailyActivations>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_name: String,
    pub activation_count: u64,
    #[serde(default)]
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyActivations {
    pub date: String,
    pub count: u64,
}
