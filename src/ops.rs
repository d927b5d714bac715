//! Shared WMS operations used across the flows.
//!
//! `PickOps` carries the API handle by reference; planners hold a `&PickOps`
//! instead of inheriting a grab-bag base. Per-call failures are logged and
//! absorbed here — a failed write never aborts a planner, and planners
//! proceed as committed so an order can never be re-selected later.

use tracing::{error, info, instrument, warn};

use crate::config;
use crate::metrics::Counters;
use crate::wms::WmsApi;
use crate::wms::types::{NewPickingOrder, ProductUpdate};

pub struct PickOps<'a> {
    pub api: &'a dyn WmsApi,
    pub counters: Counters,
}

impl<'a> PickOps<'a> {
    pub fn new(api: &'a dyn WmsApi, counters: Counters) -> Self {
        Self { api, counters }
    }

    /// Creates one picking order. A pick over a single order is never a
    /// cart, whatever the caller asked for. Returns whether the write
    /// succeeded; callers treat the pick as committed either way.
    pub async fn create_picking(
        &self,
        sales_order_ids: &[i64],
        note: &str,
        cart: bool,
        pickers: &[i64],
    ) -> bool {
        let cart = cart && sales_order_ids.len() > 1;
        let new_pick = NewPickingOrder {
            sales_orders: sales_order_ids.to_vec(),
            orders_count: 1,
            pickers: pickers.to_vec(),
            cart,
            notes: note.to_string(),
        };
        match self.api.create_picking(&new_pick).await {
            Ok(()) => {
                Counters::bump(&self.counters.picks_created);
                info!(note, orders = ?sales_order_ids, cart, "picking order created");
                true
            }
            Err(e) => {
                Counters::bump(&self.counters.picks_failed);
                error!(note, orders = ?sales_order_ids, error = %e, "picking order creation failed");
                false
            }
        }
    }

    /// Pauses a sales order. Only the sales order id works here, not the
    /// fulfillment id.
    pub async fn pause_order(&self, sales_order_id: i64) {
        match self.api.pause_sales_order(sales_order_id).await {
            Ok(()) => warn!(sales_order_id, "order paused"),
            Err(e) => error!(sales_order_id, error = %e, "pausing order failed"),
        }
    }

    /// Night maintenance: deletes every queued picking order nobody has
    /// taken yet.
    #[instrument(skip(self), target = "ops")]
    pub async fn cleaner(&self) {
        let picks = match self.api.picking_orders(config::QUEUE_STATE, None).await {
            Ok(picks) => picks,
            Err(e) => {
                error!(error = %e, "cleaner could not list picking orders");
                return;
            }
        };
        for pick in picks.iter().filter(|p| p.is_unowned()) {
            match self.api.delete_picking(pick.id).await {
                Ok(()) => warn!(picking_order = pick.id, "picking order deleted"),
                Err(e) => error!(picking_order = pick.id, error = %e, "delete failed"),
            }
        }
        info!("cleaner finished");
    }

    /// Writes a resolved pallet capacity back to the product record;
    /// barcodes ride along so the PUT does not drop them.
    pub async fn write_units_per_pallet(
        &self,
        product_id: i64,
        units_per_pallet: i64,
        barcodes: Vec<serde_json::Value>,
    ) {
        let update = ProductUpdate {
            units_per_pallet,
            barcodes,
        };
        match self.api.update_product(product_id, &update).await {
            Ok(()) => info!(product_id, units_per_pallet, "product updated"),
            Err(e) => error!(product_id, error = %e, "product update failed"),
        }
    }

    /// Open picking orders across the capacity-relevant states.
    pub async fn count_open_picking_orders(&self) -> i64 {
        let mut count = 0i64;
        for state in config::PICKING_STATES {
            match self.api.picking_orders(state, None).await {
                Ok(picks) => count += picks.len() as i64,
                Err(e) => error!(state, error = %e, "counting picking orders failed"),
            }
        }
        count
    }

    /// Outstanding queued picks assigned to one user.
    pub async fn picks_for_user(&self, user_id: i64) -> usize {
        match self
            .api
            .picking_orders(config::QUEUE_STATE, Some(user_id))
            .await
        {
            Ok(picks) => picks.len(),
            Err(e) => {
                error!(user_id, error = %e, "counting picks for user failed");
                0
            }
        }
    }
}
