//! Capacity-filling carts.
//!
//! After the shelf pass, remaining orders of the size are packed in input
//! order, one cart at a time, until the orders run out or the warehouse
//! capacity does. Same admission rule as the shelf planner, minus the
//! shelf.

use std::collections::HashMap;

use tracing::warn;

use crate::carts::{CartBuilder, admit, commit_cart, commit_items};
use crate::context::RunContext;
use crate::wms::types::FulfillmentOrder;

pub(crate) async fn run(
    builder: &CartBuilder<'_>,
    orders: &[FulfillmentOrder],
    mut space_left: i64,
    ctx: &mut RunContext,
) -> i64 {
    warn!(size = ?builder.size, orders = orders.len(), "processing random carts");

    let max_orders = builder.size.max_orders().max(1);
    let number_of_carts = orders.len().div_ceil(max_orders);
    warn!(number_of_carts, "carts that can be created");

    for _ in 0..number_of_carts {
        if space_left == 0 {
            break;
        }

        let mut cart: Vec<i64> = Vec::new();
        let mut committed: HashMap<i64, i64> = HashMap::new();
        for order in orders {
            if cart.len() >= max_orders {
                break;
            }
            if !admit(order, &cart, &committed, ctx) {
                continue;
            }
            cart.push(order.sales_order_id);
            commit_items(order, &mut committed);
        }

        if cart.is_empty() {
            break;
        }
        if builder.try_create(orders, &cart, "").await {
            space_left -= 1;
            commit_cart(orders, &cart, ctx);
        } else {
            // A rejected cart means the leftovers cannot reach the size
            // minimum; nothing further can be built from them.
            break;
        }
    }
    space_left
}
