//! Shelf-coherent carts.
//!
//! Orders touching the same shelf walk together: shelf frequencies are
//! aggregated over the order pool, shelves with enough demand are selected,
//! and each one fills a cart from the orders that have at least one item on
//! it. A cart admits an order only while every line stays inside current
//! stock minus what the cart already committed.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::carts::{CartBuilder, admit, commit_cart, commit_items};
use crate::config;
use crate::context::RunContext;
use crate::shelves::ShelvesIndex;
use crate::wms::types::FulfillmentOrder;

pub(crate) async fn run(
    builder: &CartBuilder<'_>,
    orders: &[FulfillmentOrder],
    mut space_left: i64,
    ctx: &mut RunContext,
) -> i64 {
    warn!(size = ?builder.size, "processing shelf carts");

    let frequency = shelves_frequency(orders, &ctx.shelves);
    let selected = select_shelves(&frequency, builder.size.min_orders(), builder.is_running_dry);
    if selected.is_empty() {
        return space_left;
    }
    warn!(shelves = ?selected, "shelves selected");

    for shelf in selected {
        if space_left == 0 {
            break;
        }
        let Some(products_on_shelf) = ctx.shelves.get(&shelf).cloned() else {
            continue;
        };

        let cart = fill_cart_from_shelf(builder, orders, &products_on_shelf, ctx);
        if cart.is_empty() {
            continue;
        }
        if builder.try_create(orders, &cart, &shelf).await {
            space_left -= 1;
            commit_cart(orders, &cart, ctx);
        }
    }
    space_left
}

fn fill_cart_from_shelf(
    builder: &CartBuilder<'_>,
    orders: &[FulfillmentOrder],
    products_on_shelf: &HashSet<i64>,
    ctx: &RunContext,
) -> Vec<i64> {
    let mut cart: Vec<i64> = Vec::new();
    let mut committed: HashMap<i64, i64> = HashMap::new();

    for order in orders {
        if cart.len() >= builder.size.max_orders() {
            break;
        }
        if !order_touches_shelf(order, products_on_shelf) {
            continue;
        }
        if !admit(order, &cart, &committed, ctx) {
            continue;
        }
        cart.push(order.sales_order_id);
        commit_items(order, &mut committed);
    }
    cart
}

fn order_touches_shelf(order: &FulfillmentOrder, products_on_shelf: &HashSet<i64>) -> bool {
    order
        .items
        .iter()
        .any(|item| item.product_id().is_some_and(|pid| products_on_shelf.contains(&pid)))
}

/// Shelf demand over the order pool: each order contributes its *set* of
/// touched shelves once. Descending by frequency, ties by shelf code.
pub(crate) fn shelves_frequency(
    orders: &[FulfillmentOrder],
    index: &ShelvesIndex,
) -> Vec<(String, usize)> {
    let mut frequency: HashMap<&str, usize> = HashMap::new();
    for order in orders {
        for shelf in shelves_for_order(order, index) {
            *frequency.entry(shelf).or_insert(0) += 1;
        }
    }
    let mut sorted: Vec<(String, usize)> = frequency
        .into_iter()
        .map(|(shelf, count)| (shelf.to_string(), count))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

fn shelves_for_order<'i>(order: &FulfillmentOrder, index: &'i ShelvesIndex) -> HashSet<&'i str> {
    let mut shelves = HashSet::new();
    for item in &order.items {
        let Some(pid) = item.product_id() else {
            continue;
        };
        for (shelf, products) in index {
            if products.contains(&pid) {
                shelves.insert(shelf.as_str());
            }
        }
    }
    shelves
}

/// Shelves whose demand reaches the minimum (scaled down when the
/// warehouse is running dry).
pub(crate) fn select_shelves(
    frequency: &[(String, usize)],
    minimum_orders: usize,
    is_running_dry: bool,
) -> Vec<String> {
    let mut threshold = minimum_orders as f64;
    if is_running_dry {
        threshold *= config::RUNNING_DRY_DENOMINATOR;
    }
    frequency
        .iter()
        .filter(|(_, count)| *count as f64 >= threshold)
        .map(|(shelf, _)| shelf.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(id: i64, product_ids: &[i64]) -> FulfillmentOrder {
        let items: Vec<serde_json::Value> = product_ids
            .iter()
            .map(|pid| json!({"product_id": pid, "quantity": 1}))
            .collect();
        serde_json::from_value(json!({
            "sales_order_id": id,
            "state": "queue",
            "items": items,
        }))
        .unwrap()
    }

    fn index(entries: &[(&str, &[i64])]) -> ShelvesIndex {
        entries
            .iter()
            .map(|(shelf, pids)| (shelf.to_string(), pids.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn frequency_counts_each_order_once_per_shelf() {
        let idx = index(&[("H1-111", &[1, 2]), ("H2-040", &[3])]);
        // Order 10 touches H1-111 twice through two items, still one vote.
        let orders = vec![order(10, &[1, 2]), order(11, &[1]), order(12, &[3])];
        let freq = shelves_frequency(&orders, &idx);
        assert_eq!(freq[0], ("H1-111".to_string(), 2));
        assert_eq!(freq[1], ("H2-040".to_string(), 1));
    }

    #[test]
    fn selection_applies_the_running_dry_scale() {
        let freq = vec![("H1-111".to_string(), 2), ("H2-040".to_string(), 1)];
        assert_eq!(select_shelves(&freq, 2, false), vec!["H1-111"]);
        // 2 * 0.1 = 0.2 -> both shelves qualify when running dry.
        assert_eq!(select_shelves(&freq, 2, true).len(), 2);
    }

    #[test]
    fn orders_off_the_shelf_are_not_admitted() {
        let on_shelf: HashSet<i64> = [1, 2].into_iter().collect();
        assert!(order_touches_shelf(&order(1, &[2, 9]), &on_shelf));
        assert!(!order_touches_shelf(&order(2, &[9]), &on_shelf));
    }
}
