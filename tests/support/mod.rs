//! In-memory WMS for integration tests.
//!
//! Mirrors the observable behavior the flows rely on: pausing an order
//! removes it from the queue scan, created picking orders count against
//! warehouse capacity, and per-user outstanding picks drive assignment.

#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use chrono_tz::Europe::Berlin;
use chrono_tz::Tz;
use parking_lot::Mutex;

use pulpo_bot::wms::types::{
    FulfillmentOrder, NewPickingOrder, PickingOrderRecord, Product, ProductUpdate, StockRecord,
    User,
};
use pulpo_bot::wms::{WmsApi, WmsError};

#[derive(Default)]
pub struct MockWms {
    pub fulfillments: Vec<FulfillmentOrder>,
    pub stocks: Vec<StockRecord>,
    pub products: HashMap<i64, Product>,
    pub users: HashMap<String, i64>,
    /// Outstanding queued picks per owner, for assignment balancing.
    pub user_picks: HashMap<i64, usize>,
    /// Pre-existing picking orders as (state, record).
    pub open_picks: Vec<(String, PickingOrderRecord)>,

    pub paused: Mutex<Vec<i64>>,
    pub created: Mutex<Vec<NewPickingOrder>>,
    pub deleted: Mutex<Vec<i64>>,
    pub product_updates: Mutex<Vec<(i64, i64)>>,
}

impl MockWms {
    pub fn created_picks(&self) -> Vec<NewPickingOrder> {
        self.created.lock().clone()
    }

    pub fn paused_orders(&self) -> Vec<i64> {
        self.paused.lock().clone()
    }
}

#[async_trait]
impl WmsApi for MockWms {
    async fn queued_fulfillments(&self) -> Result<Vec<FulfillmentOrder>, WmsError> {
        let paused = self.paused.lock();
        Ok(self
            .fulfillments
            .iter()
            .filter(|o| !paused.contains(&o.sales_order_id))
            .cloned()
            .collect())
    }

    async fn stock_records(&self) -> Result<Vec<StockRecord>, WmsError> {
        Ok(self.stocks.clone())
    }

    async fn product(&self, product_id: i64) -> Result<Product, WmsError> {
        self.products
            .get(&product_id)
            .cloned()
            .ok_or(WmsError::Http { status: 404 })
    }

    async fn update_product(
        &self,
        product_id: i64,
        update: &ProductUpdate,
    ) -> Result<(), WmsError> {
        self.product_updates
            .lock()
            .push((product_id, update.units_per_pallet));
        Ok(())
    }

    async fn create_picking(&self, new_pick: &NewPickingOrder) -> Result<(), WmsError> {
        self.created.lock().push(new_pick.clone());
        Ok(())
    }

    async fn delete_picking(&self, picking_order_id: i64) -> Result<(), WmsError> {
        self.deleted.lock().push(picking_order_id);
        Ok(())
    }

    async fn picking_orders(
        &self,
        state: &str,
        owner_id: Option<i64>,
    ) -> Result<Vec<PickingOrderRecord>, WmsError> {
        if let Some(owner) = owner_id {
            let count = self.user_picks.get(&owner).copied().unwrap_or(0);
            let record = serde_json::json!({"id": 0, "owner": {"id": owner}});
            return Ok((0..count)
                .map(|_| serde_json::from_value(record.clone()).unwrap())
                .collect());
        }

        let mut picks: Vec<PickingOrderRecord> = self
            .open_picks
            .iter()
            .filter(|(s, _)| s == state)
            .map(|(_, record)| record.clone())
            .collect();

        // Picks created during the run are queued and unowned.
        if state == "queue" {
            for (i, _) in self.created.lock().iter().enumerate() {
                picks.push(
                    serde_json::from_value(serde_json::json!({"id": 100_000 + i as i64}))
                        .unwrap(),
                );
            }
        }
        Ok(picks)
    }

    async fn pause_sales_order(&self, sales_order_id: i64) -> Result<(), WmsError> {
        self.paused.lock().push(sales_order_id);
        Ok(())
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, WmsError> {
        Ok(self.users.get(username).map(|id| {
            serde_json::from_value(serde_json::json!({"id": id, "username": username})).unwrap()
        }))
    }
}

// =========================
// Builders
// =========================

pub fn order(value: serde_json::Value) -> FulfillmentOrder {
    serde_json::from_value(value).unwrap()
}

pub fn stock(product_id: i64, quantity: i64, code: &str) -> StockRecord {
    serde_json::from_value(serde_json::json!({
        "product_id": product_id,
        "quantity": quantity,
        "location": {"zone_id": 1419, "code": code},
    }))
    .unwrap()
}

pub fn product(
    id: i64,
    name: &str,
    sku: &str,
    units_per_pallet: Option<f64>,
) -> Product {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": name,
        "sku": sku,
        "units_per_pallet": units_per_pallet,
    }))
    .unwrap()
}

pub fn berlin(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
    Berlin.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}
