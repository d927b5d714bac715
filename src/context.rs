//! Per-run mutable plan state.
//!
//! The orchestrator owns one `RunContext` per invocation and passes it
//! `&mut` to each planner in sequence; nothing here is shared or global.
//! The processed set grows monotonically; availability is decremented
//! exactly when a pick is emitted, so every later stage observes what
//! earlier stages consumed.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::shelves::{ShelvesIndex, StockTopology};
use crate::wms::types::FulfillmentOrder;

pub struct RunContext {
    pub shelves: ShelvesIndex,
    stock: HashMap<i64, i64>,
    processed: HashSet<i64>,
}

impl RunContext {
    pub fn new(topology: StockTopology) -> Self {
        Self {
            shelves: topology.shelves,
            stock: topology.availability,
            processed: HashSet::new(),
        }
    }

    pub fn is_processed(&self, sales_order_id: i64) -> bool {
        self.processed.contains(&sales_order_id)
    }

    pub fn mark_processed<I: IntoIterator<Item = i64>>(&mut self, ids: I) {
        self.processed.extend(ids);
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn available(&self, product_id: i64) -> i64 {
        self.stock.get(&product_id).copied().unwrap_or(0)
    }

    /// Every line of the order must be covered by current availability.
    pub fn all_items_available(&self, order: &FulfillmentOrder) -> bool {
        order.items.iter().all(|item| {
            item.product_id()
                .is_some_and(|pid| self.available(pid) >= item.qty())
        })
    }

    /// Availability check for cart building: current stock minus what the
    /// cart under construction has already committed.
    pub fn order_fits_with_committed(
        &self,
        order: &FulfillmentOrder,
        committed: &HashMap<i64, i64>,
    ) -> bool {
        order.items.iter().all(|item| {
            let Some(pid) = item.product_id() else {
                return false;
            };
            let in_cart = committed.get(&pid).copied().unwrap_or(0);
            self.available(pid) >= in_cart + item.qty()
        })
    }

    /// Decrements availability for one product. Availability never goes
    /// below zero; planners check before they consume, so a clamp firing
    /// means a planner bug and is logged loudly.
    pub fn consume(&mut self, product_id: i64, quantity: i64) {
        let entry = self.stock.entry(product_id).or_insert(0);
        if *entry < quantity {
            warn!(product_id, available = *entry, quantity, "stock clamped at zero");
            *entry = 0;
        } else {
            *entry -= quantity;
        }
    }

    /// Decrements availability for every line of the order.
    pub fn consume_order(&mut self, order: &FulfillmentOrder) {
        for item in &order.items {
            if let Some(pid) = item.product_id() {
                self.consume(pid, item.qty());
            }
        }
    }
}
