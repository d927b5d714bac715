//! Wire records of the WMS API.
//!
//! The WMS sends wide objects with plenty of nulls; only the fields the
//! flows actually read are modelled, everything else is ignored. Optional
//! fields stay `Option` so a sparse record never kills a whole page —
//! per-record decode failures are logged and skipped at the API layer.

use serde::{Deserialize, Serialize};

fn default_priority() -> i64 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    pub zip: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipTo {
    #[serde(default)]
    pub address: Address,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductAttributes {
    pub weclapp_article_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductCategory {
    pub id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Product {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub sku: Option<String>,
    pub units_per_pallet: Option<f64>,
    #[serde(default)]
    pub product_categories: Vec<ProductCategory>,
    #[serde(default)]
    pub attributes: ProductAttributes,
    #[serde(default)]
    pub barcodes: Vec<serde_json::Value>,
}

impl Product {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed product>")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Item {
    pub product_id: Option<i64>,
    pub quantity: Option<i64>,
    #[serde(default)]
    pub product: Product,
}

impl Item {
    pub fn qty(&self) -> i64 {
        self.quantity.unwrap_or(0)
    }

    /// Product id of the line; the embedded product record wins over the
    /// flat foreign key when both are present.
    pub fn product_id(&self) -> Option<i64> {
        self.product.id.or(self.product_id)
    }
}

/// Fulfillment projection of a sales order. Only fulfillments carry the
/// true picking state: pausing a sales order is visible here first.
#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentOrder {
    pub id: Option<i64>,
    pub sales_order_id: i64,
    pub state: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
    pub channel: Option<String>,
    pub shipping_method_id: Option<i64>,
    pub delivery_date: Option<String>,
    /// Comma-separated tag list; the `LA_<a>_<b>` tag encodes label share.
    pub criterium: Option<String>,
    #[serde(default)]
    pub ship_to: ShipTo,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockLocation {
    pub zone_id: Option<i64>,
    /// Positional code; the first six characters name the shelf.
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockRecord {
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product: Product,
    pub quantity: Option<i64>,
    #[serde(default)]
    pub location: StockLocation,
}

impl StockRecord {
    pub fn product_id(&self) -> Option<i64> {
        self.product.id.or(self.product_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

/// Body of `POST picking/orders`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPickingOrder {
    pub sales_orders: Vec<i64>,
    pub orders_count: i64,
    pub pickers: Vec<i64>,
    pub cart: bool,
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PickingOrderRecord {
    pub id: i64,
    #[serde(default)]
    pub owner: Option<serde_json::Value>,
    pub state: Option<String>,
}

impl PickingOrderRecord {
    pub fn is_unowned(&self) -> bool {
        matches!(&self.owner, None | Some(serde_json::Value::Null))
    }
}

/// Body of the `units_per_pallet` write-back. The WMS drops barcodes on a
/// partial PUT, so they ride along unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct ProductUpdate {
    pub units_per_pallet: i64,
    pub barcodes: Vec<serde_json::Value>,
}
