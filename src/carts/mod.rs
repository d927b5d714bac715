//! Cart creation.
//!
//! One cart holds several orders of the same trolley class. Remaining
//! warehouse capacity is checked first (priority runs are unbounded), then
//! the shelf planner groups orders that share a shelf and the random
//! planner fills whatever capacity is left. One manager lives for the whole
//! run, so the no-space flag sticks across sizes and priority bands.

pub mod random;
pub mod shelf;

use std::collections::HashMap;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{instrument, warn};

use crate::classify;
use crate::config::{self, PackageSize};
use crate::context::RunContext;
use crate::metrics::Counters;
use crate::notes::{NoteComposer, NoteParts};
use crate::ops::PickOps;
use crate::wms::types::FulfillmentOrder;

pub struct CartsManager<'a> {
    pub ops: &'a PickOps<'a>,
    pub now: DateTime<Tz>,
    pub is_sweeping_time: bool,
    pub is_running_dry: bool,
    /// Sticky: once the warehouse is over the threshold, later sizes skip
    /// cart creation outside sweeping time.
    pub no_space_left: bool,
}

impl<'a> CartsManager<'a> {
    pub fn new(
        ops: &'a PickOps<'a>,
        now: DateTime<Tz>,
        is_sweeping_time: bool,
        is_running_dry: bool,
    ) -> Self {
        Self {
            ops,
            now,
            is_sweeping_time,
            is_running_dry,
            no_space_left: false,
        }
    }

    #[instrument(
        skip(self, orders, ctx),
        target = "carts",
        fields(size = ?size, orders = orders.len(), is_prio)
    )]
    pub async fn run_size(
        &mut self,
        size: PackageSize,
        orders: &[FulfillmentOrder],
        is_prio: bool,
        ctx: &mut RunContext,
    ) {
        let mut space_left = self.check_space(is_prio).await;
        let orders_to_process = select_orders_by_size(orders, size, ctx);
        warn!(
            space_left,
            candidates = orders_to_process.len(),
            "cart candidates selected"
        );

        if orders_to_process.is_empty() || (space_left <= 0 && !self.is_sweeping_time) {
            return;
        }

        let builder = CartBuilder {
            ops: self.ops,
            now: self.now,
            is_prio,
            is_sweeping_time: self.is_sweeping_time,
            is_running_dry: self.is_running_dry,
            size,
        };

        space_left = shelf::run(&builder, &orders_to_process, space_left, ctx).await;
        warn!(space_left, "space left after shelf pass");

        if space_left > 0 {
            let remaining: Vec<FulfillmentOrder> = orders_to_process
                .into_iter()
                .filter(|o| !ctx.is_processed(o.sales_order_id))
                .collect();
            random::run(&builder, &remaining, space_left, ctx).await;
        }
    }

    /// Capacity left for new picks. Priority runs are unbounded; otherwise
    /// the open picking orders (`queue` + `taken`) count against the
    /// threshold.
    async fn check_space(&mut self, is_prio: bool) -> i64 {
        if is_prio {
            return i64::MAX;
        }
        let open = self.ops.count_open_picking_orders().await;
        warn!(open, "open picking orders");
        let space_left = config::NON_PRIO_THRESHOLD - open;
        if space_left < 0 {
            self.no_space_left = true;
        }
        space_left
    }
}

/// Unprocessed orders whose classified size bucket matches `size`.
pub(crate) fn select_orders_by_size(
    orders: &[FulfillmentOrder],
    size: PackageSize,
    ctx: &RunContext,
) -> Vec<FulfillmentOrder> {
    orders
        .iter()
        .filter(|o| !ctx.is_processed(o.sales_order_id))
        .filter(|o| classify::cart_bucket_for(classify::label_share(o)) == Some(size))
        .cloned()
        .collect()
}

/// Everything both cart planners need to turn a filled cart into a pick.
pub(crate) struct CartBuilder<'a> {
    pub ops: &'a PickOps<'a>,
    pub now: DateTime<Tz>,
    pub is_prio: bool,
    pub is_sweeping_time: bool,
    pub is_running_dry: bool,
    pub size: PackageSize,
}

impl CartBuilder<'_> {
    /// Minimum orders for an acceptable cart. Running dry scales it down;
    /// a priority run in sweeping time collapses it to one.
    pub(crate) fn effective_min(&self) -> f64 {
        let mut minimum = self.size.min_orders() as f64;
        if self.is_running_dry {
            minimum *= config::RUNNING_DRY_DENOMINATOR;
        }
        if self.is_prio && self.is_sweeping_time {
            minimum = config::SWEEPING_MIN_ORDERS as f64;
        }
        minimum
    }

    /// Emits the cart if it lands inside the size bounds. Returns whether
    /// a pick was committed.
    pub(crate) async fn try_create(
        &self,
        orders_for_notes: &[FulfillmentOrder],
        cart: &[i64],
        shelf: &str,
    ) -> bool {
        if (cart.len() as f64) < self.effective_min() || cart.len() > self.size.max_orders() {
            return false;
        }
        let composer = NoteComposer {
            now: self.now,
            orders: orders_for_notes,
            is_prio: self.is_prio,
            is_batch: false,
            is_sweeping_time: self.is_sweeping_time,
        };
        let note = composer.compose(
            cart,
            NoteParts {
                size_note: Some(self.size.note()),
                shelf: (!shelf.is_empty()).then_some(shelf),
                ..Default::default()
            },
        );
        self.ops.create_picking(cart, &note, true, &[]).await;
        Counters::bump(&self.ops.counters.carts_created);
        true
    }
}

/// Cart admission: unprocessed, not already in the cart, and every line
/// still covered by stock minus what the cart has committed.
pub(crate) fn admit(
    order: &FulfillmentOrder,
    cart: &[i64],
    committed: &HashMap<i64, i64>,
    ctx: &RunContext,
) -> bool {
    !ctx.is_processed(order.sales_order_id)
        && !cart.contains(&order.sales_order_id)
        && ctx.order_fits_with_committed(order, committed)
}

pub(crate) fn commit_items(order: &FulfillmentOrder, committed: &mut HashMap<i64, i64>) {
    for item in &order.items {
        if let Some(pid) = item.product_id() {
            *committed.entry(pid).or_insert(0) += item.qty();
        }
    }
}

/// Marks the cart's orders processed and burns their stock.
pub(crate) fn commit_cart(orders: &[FulfillmentOrder], cart: &[i64], ctx: &mut RunContext) {
    for order in orders.iter().filter(|o| cart.contains(&o.sales_order_id)) {
        ctx.consume_order(order);
    }
    ctx.mark_processed(cart.iter().copied());
}
