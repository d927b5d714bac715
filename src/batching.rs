//! SKU batching.
//!
//! One batch is one product: single-line orders of the same SKU are picked
//! together, bounded by the product's pallet capacity and a cap on orders
//! per batch. Products under the special-palette regime first peel off
//! orders big enough to ship as an individual palette, then the remainder
//! is batched normally.
//!
//! Pallet capacity resolution walks WMS product record -> article service
//! (with a write-back on success) -> operator alert + unbounded.

use std::collections::{HashMap, HashSet};

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{error, info, instrument, warn};

use crate::alerts::Alerts;
use crate::article::ArticleClient;
use crate::classify;
use crate::config::{self, SkusToBatch};
use crate::context::RunContext;
use crate::metrics::Counters;
use crate::notes::{NoteComposer, NoteParts};
use crate::ops::PickOps;
use crate::wms::types::{FulfillmentOrder, Product};
use crate::wms::{WmsApi, WmsError};

/// A single-line order competing for a batch of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub sales_order_id: i64,
    pub quantity: i64,
}

pub struct BatchPlanner<'a> {
    pub ops: &'a PickOps<'a>,
    pub article: &'a ArticleClient,
    pub alerts: &'a Alerts,
    pub skus_to_batch: &'a SkusToBatch,
    pub now: DateTime<Tz>,
    pub is_prio: bool,
    pub is_running_dry: bool,
}

impl BatchPlanner<'_> {
    #[instrument(
        skip(self, orders, ctx),
        target = "batching",
        fields(orders = orders.len(), is_prio = self.is_prio)
    )]
    pub async fn run(&self, orders: &[FulfillmentOrder], ctx: &mut RunContext) {
        let (counts, seni_product_ids) = single_sku_counts(orders, ctx);

        let mut products: Vec<i64> = counts
            .iter()
            .filter(|(pid, count)| {
                **count as i64 >= self.min_batch_size(**pid, &seni_product_ids)
            })
            .map(|(pid, _)| *pid)
            .collect();
        products.sort_unstable();

        warn!(?products, "products to batch");

        for product_id in products {
            if let Err(e) = self
                .batch_product(product_id, orders, &seni_product_ids, ctx)
                .await
            {
                error!(product_id, error = %e, "batching failed for product");
            }
        }
    }

    /// Effective minimum batch size for a product: Seni products batch
    /// earlier, and running dry scales everything down.
    fn min_batch_size(&self, product_id: i64, seni_product_ids: &HashSet<i64>) -> i64 {
        let base = if seni_product_ids.contains(&product_id) {
            config::MIN_BATCH_SIZE_SENI
        } else {
            config::MIN_BATCH_SIZE
        };
        if self.is_running_dry {
            (base as f64 * config::RUNNING_DRY_DENOMINATOR).round() as i64
        } else {
            base
        }
    }

    async fn batch_product(
        &self,
        product_id: i64,
        orders: &[FulfillmentOrder],
        seni_product_ids: &HashSet<i64>,
        ctx: &mut RunContext,
    ) -> Result<(), WmsError> {
        let (max_per_pallet, product) = self.resolve_pallet_capacity(product_id).await?;
        let min_batch = self.min_batch_size(product_id, seni_product_ids);

        let mut candidates = collect_candidates(orders, product_id, ctx);
        let mut total: i64 = candidates.iter().map(|c| c.quantity).sum();
        let current_stock = ctx.available(product_id);

        info!(
            product_id,
            current_stock,
            total,
            ?max_per_pallet,
            "batching product"
        );

        if total > current_stock {
            warn!(
                product_id,
                current_stock, "stock below demand, truncating batch"
            );
            let fitted = truncate_to_stock(&candidates, current_stock);
            if (fitted.len() as i64) <= min_batch {
                warn!(product_id, "not enough orders fit under stock, skipping");
                return Ok(());
            }
            total = fitted.iter().map(|c| c.quantity).sum();
            candidates = fitted;
        }

        if self.skus_to_batch.contains_product(product_id) {
            total = self
                .special_palette_pass(product_id, &candidates, total, &product, orders, ctx)
                .await;
            candidates.retain(|c| !ctx.is_processed(c.sales_order_id));
            if candidates.is_empty()
                || total <= min_batch
                || (candidates.len() as i64) < min_batch
            {
                return Ok(());
            }
        }

        self.regular_batching(
            product_id,
            &candidates,
            total,
            max_per_pallet,
            min_batch,
            &product,
            orders,
            ctx,
        )
        .await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn regular_batching(
        &self,
        product_id: i64,
        candidates: &[Candidate],
        total: i64,
        max_per_pallet: Option<i64>,
        min_batch: i64,
        product: &Product,
        orders: &[FulfillmentOrder],
        ctx: &mut RunContext,
    ) {
        let fits_one_pallet = max_per_pallet.is_none_or(|m| total <= m);
        if fits_one_pallet && candidates.len() <= config::MAX_BATCH_SIZE {
            let ids: Vec<i64> = candidates.iter().map(|c| c.sales_order_id).collect();
            self.emit_batch(&ids, total, product, orders, product_id, ctx)
                .await;
            return;
        }

        warn!(product_id, "single batch impossible, splitting");
        let planned = planned_batch_count(
            total,
            candidates.len(),
            max_per_pallet,
            config::MAX_BATCH_SIZE,
        );
        for _ in 0..planned {
            let (ids, quantity) =
                fill_batch(candidates, ctx, max_per_pallet, config::MAX_BATCH_SIZE);
            if ids.is_empty() {
                break;
            }
            // The pallet bound can leave a tail below the minimum batch
            // size; those orders stay for later stages.
            if (ids.len() as i64) < min_batch {
                warn!(
                    product_id,
                    orders = ids.len(),
                    min_batch,
                    "remaining orders below minimum batch size, not batching"
                );
                break;
            }
            self.emit_batch(&ids, quantity, product, orders, product_id, ctx)
                .await;
        }
    }

    /// Individual palettes for special-regime orders big enough to stand
    /// alone. Returns the quantity still open for regular batching.
    #[allow(clippy::too_many_arguments)]
    async fn special_palette_pass(
        &self,
        product_id: i64,
        candidates: &[Candidate],
        total: i64,
        product: &Product,
        orders: &[FulfillmentOrder],
        ctx: &mut RunContext,
    ) -> i64 {
        let Some(separate_from) = self.skus_to_batch.separation_value(product_id) else {
            return total;
        };
        let mut remaining = total;
        for candidate in candidates {
            if remaining <= 0 {
                break;
            }
            if candidate.quantity >= separate_from
                && candidate.quantity <= remaining
                && !ctx.is_processed(candidate.sales_order_id)
            {
                let composer = self.composer(orders);
                let note = composer.compose(
                    &[candidate.sales_order_id],
                    NoteParts {
                        batched: Some((candidate.quantity, product.display_name())),
                        ..Default::default()
                    },
                );
                self.ops
                    .create_picking(&[candidate.sales_order_id], &note, false, &[])
                    .await;
                Counters::bump(&self.ops.counters.singles_created);
                ctx.mark_processed([candidate.sales_order_id]);
                ctx.consume(product_id, candidate.quantity);
                remaining -= candidate.quantity;
            }
        }
        remaining
    }

    async fn emit_batch(
        &self,
        sales_order_ids: &[i64],
        quantity: i64,
        product: &Product,
        orders: &[FulfillmentOrder],
        product_id: i64,
        ctx: &mut RunContext,
    ) {
        let composer = self.composer(orders);
        let note = composer.compose(
            sales_order_ids,
            NoteParts {
                batched: Some((quantity, product.display_name())),
                ..Default::default()
            },
        );
        self.ops
            .create_picking(sales_order_ids, &note, false, &[])
            .await;
        Counters::bump(&self.ops.counters.batches_created);
        ctx.mark_processed(sales_order_ids.iter().copied());
        ctx.consume(product_id, quantity);
    }

    fn composer<'o>(&self, orders: &'o [FulfillmentOrder]) -> NoteComposer<'o> {
        NoteComposer {
            now: self.now,
            orders,
            is_prio: self.is_prio,
            is_batch: true,
            is_sweeping_time: false,
        }
    }

    /// Pallet capacity: WMS record first, article service second (with a
    /// write-back), unbounded plus an operator alert as the last resort.
    async fn resolve_pallet_capacity(
        &self,
        product_id: i64,
    ) -> Result<(Option<i64>, Product), WmsError> {
        let product = self.ops.api.product(product_id).await?;

        if let Some(units) = product.units_per_pallet {
            if units > 0.0 {
                return Ok((Some(units as i64), product));
            }
        }

        match self.article.units_per_pallet(&product).await {
            Ok(Some(units)) if units > 0 => {
                self.ops
                    .write_units_per_pallet(product_id, units, product.barcodes.clone())
                    .await;
                return Ok((Some(units), product));
            }
            Ok(_) => {}
            Err(e) => {
                error!(product_id, error = %e, "article service unavailable");
            }
        }

        warn!(
            product = product.display_name(),
            "no pallet information anywhere, batching unbounded"
        );
        self.alerts.pallet_info_missing(&product).await;
        Ok((None, product))
    }
}

/// Counts single-line orders per product and collects the Seni product
/// ids seen along the way. Processed orders are out.
pub(crate) fn single_sku_counts(
    orders: &[FulfillmentOrder],
    ctx: &RunContext,
) -> (HashMap<i64, usize>, HashSet<i64>) {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    let mut seni: HashSet<i64> = HashSet::new();

    for order in orders {
        if ctx.is_processed(order.sales_order_id) {
            continue;
        }
        if let [item] = order.items.as_slice() {
            let Some(product_id) = item.product_id() else {
                continue;
            };
            *counts.entry(product_id).or_insert(0) += 1;
            if classify::item_is_seni(item) {
                seni.insert(product_id);
            }
        }
    }
    (counts, seni)
}

/// Candidate orders for one product, largest quantity first.
pub(crate) fn collect_candidates(
    orders: &[FulfillmentOrder],
    product_id: i64,
    ctx: &RunContext,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = orders
        .iter()
        .filter(|o| !ctx.is_processed(o.sales_order_id))
        .filter_map(|o| match o.items.as_slice() {
            [item] if item.product_id() == Some(product_id) => Some(Candidate {
                sales_order_id: o.sales_order_id,
                quantity: item.qty(),
            }),
            _ => None,
        })
        .collect();
    candidates.sort_by(|a, b| b.quantity.cmp(&a.quantity));
    candidates
}

/// Greedy prefix of the descending candidate list whose cumulative
/// quantity stays strictly under the available stock.
pub(crate) fn truncate_to_stock(candidates: &[Candidate], stock: i64) -> Vec<Candidate> {
    let mut fitted_quantity = 0;
    candidates
        .iter()
        .filter(|c| {
            if fitted_quantity + c.quantity < stock {
                fitted_quantity += c.quantity;
                true
            } else {
                false
            }
        })
        .copied()
        .collect()
}

/// How many batches the split pass should build: enough pallets for the
/// total quantity and enough batches for the order count, whichever asks
/// for more.
fn div_ceil_i64(lhs: i64, rhs: i64) -> i64 {
    let d = lhs.wrapping_div(rhs);
    let r = lhs.wrapping_rem(rhs);
    if (r > 0 && rhs > 0) || (r < 0 && rhs < 0) {
        d + 1
    } else {
        d
    }
}

pub(crate) fn planned_batch_count(
    total: i64,
    count: usize,
    max_per_pallet: Option<i64>,
    max_batch: usize,
) -> usize {
    let by_orders = count.div_ceil(max_batch);
    match max_per_pallet {
        Some(m) if m > 0 => (div_ceil_i64(total, m) as usize).max(by_orders),
        _ => by_orders,
    }
}

/// Fills one batch from the descending candidate list: skip consumed
/// orders, stop at the pallet bound or the order cap.
pub(crate) fn fill_batch(
    candidates: &[Candidate],
    ctx: &RunContext,
    max_per_pallet: Option<i64>,
    max_batch: usize,
) -> (Vec<i64>, i64) {
    let mut ids = Vec::new();
    let mut quantity = 0;
    for candidate in candidates {
        if ctx.is_processed(candidate.sales_order_id) {
            continue;
        }
        if let Some(m) = max_per_pallet {
            if quantity + candidate.quantity > m {
                break;
            }
        }
        if ids.len() >= max_batch {
            break;
        }
        ids.push(candidate.sales_order_id);
        quantity += candidate.quantity;
    }
    (ids, quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shelves::StockTopology;
    use serde_json::json;

    fn ctx() -> RunContext {
        RunContext::new(StockTopology::default())
    }

    fn candidates(quantities: &[i64]) -> Vec<Candidate> {
        quantities
            .iter()
            .enumerate()
            .map(|(i, q)| Candidate {
                sales_order_id: i as i64 + 1,
                quantity: *q,
            })
            .collect()
    }

    fn single_item_order(id: i64, product_id: i64, qty: i64) -> FulfillmentOrder {
        serde_json::from_value(json!({
            "sales_order_id": id,
            "state": "queue",
            "items": [{"product_id": product_id, "quantity": qty}],
        }))
        .unwrap()
    }

    #[test]
    fn single_sku_counts_skip_multi_line_and_processed() {
        let mut c = ctx();
        c.mark_processed([3]);
        let orders = vec![
            single_item_order(1, 10, 2),
            single_item_order(2, 10, 1),
            single_item_order(3, 10, 1),
            serde_json::from_value(json!({
                "sales_order_id": 4,
                "items": [
                    {"product_id": 10, "quantity": 1},
                    {"product_id": 11, "quantity": 1},
                ],
            }))
            .unwrap(),
        ];
        let (counts, seni) = single_sku_counts(&orders, &c);
        assert_eq!(counts[&10], 2);
        assert!(seni.is_empty());
    }

    #[test]
    fn candidates_sort_descending_by_quantity() {
        let orders = vec![
            single_item_order(1, 10, 3),
            single_item_order(2, 10, 9),
            single_item_order(3, 10, 5),
            single_item_order(4, 11, 100),
        ];
        let got = collect_candidates(&orders, 10, &ctx());
        let quantities: Vec<i64> = got.iter().map(|c| c.quantity).collect();
        assert_eq!(quantities, vec![9, 5, 3]);
    }

    #[test]
    fn truncation_keeps_the_prefix_strictly_under_stock() {
        let fitted = truncate_to_stock(&candidates(&[10, 10, 10, 10]), 25);
        assert_eq!(fitted.len(), 2, "20 < 25 but 30 is not");
        let total: i64 = fitted.iter().map(|c| c.quantity).sum();
        assert_eq!(total, 20);
    }

    #[test]
    fn planned_batch_count_covers_both_limits() {
        // Scenario B shape: 100 units over 2 pallets of 50, 10 orders.
        assert_eq!(planned_batch_count(100, 10, Some(50), 100), 2);
        // Many small orders, count-bound.
        assert_eq!(planned_batch_count(250, 250, Some(1000), 100), 3);
        // Unbounded pallet: count is the only limit.
        assert_eq!(planned_batch_count(10_000, 150, None, 100), 2);
    }

    #[test]
    fn fill_batch_respects_pallet_and_count_bounds() {
        let c = ctx();
        let cands = candidates(&[30, 30, 30, 30]);
        let (ids, qty) = fill_batch(&cands, &c, Some(70), 100);
        assert_eq!(ids.len(), 2);
        assert_eq!(qty, 60);

        let (ids, qty) = fill_batch(&cands, &c, None, 3);
        assert_eq!(ids.len(), 3);
        assert_eq!(qty, 90);
    }

    #[test]
    fn fill_batch_skips_processed_orders() {
        let mut c = ctx();
        c.mark_processed([1, 2]);
        let cands = candidates(&[30, 30, 30, 30]);
        let (ids, qty) = fill_batch(&cands, &c, Some(100), 100);
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(qty, 60);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::shelves::StockTopology;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]
        /// Split batches never exceed the pallet bound or the order cap,
        /// and no order lands in two batches.
        #[test]
        fn split_batches_respect_bounds(
            quantities in prop::collection::vec(1i64..200, 1..60),
            max_per_pallet in 50i64..500,
            max_batch in 1usize..20,
        ) {
            let candidates: Vec<Candidate> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| Candidate { sales_order_id: i as i64, quantity: *q })
                .collect();
            let total: i64 = quantities.iter().sum();
            let planned = planned_batch_count(total, candidates.len(), Some(max_per_pallet), max_batch);

            let mut ctx = RunContext::new(StockTopology::default());
            let mut seen = std::collections::HashSet::new();
            for _ in 0..planned {
                let (ids, qty) = fill_batch(&candidates, &ctx, Some(max_per_pallet), max_batch);
                if ids.is_empty() {
                    break;
                }
                prop_assert!(qty <= max_per_pallet, "pallet bound violated: {qty} > {max_per_pallet}");
                prop_assert!(ids.len() <= max_batch);
                for id in &ids {
                    prop_assert!(seen.insert(*id), "order {id} emitted twice");
                }
                ctx.mark_processed(ids);
            }
        }

        /// Truncation output always fits strictly under the stock figure.
        #[test]
        fn truncation_is_stock_safe(
            quantities in prop::collection::vec(1i64..100, 0..40),
            stock in 0i64..1000,
        ) {
            let candidates: Vec<Candidate> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| Candidate { sales_order_id: i as i64, quantity: *q })
                .collect();
            let fitted = truncate_to_stock(&candidates, stock);
            let total: i64 = fitted.iter().map(|c| c.quantity).sum();
            prop_assert!(total <= stock.max(0));
        }
    }
}
