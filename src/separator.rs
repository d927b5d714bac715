//! Order separation.
//!
//! One pass over the queued fulfillment orders. Orders that must become a
//! single pick (Partnerkunde, elevated priority, palette-sized or special
//! shipping) are emitted on the spot; everything else is routed into six
//! buckets — priority or not, crossed with batch-eligible and the two cart
//! cohorts — for the planners that follow.
//!
//! Availability is checked against the pre-run stock snapshot; the check
//! itself never mutates it, only emitted picks do.

use std::collections::HashMap;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{debug, instrument, warn};

use crate::classify;
use crate::config::{self, SkusToBatch};
use crate::context::RunContext;
use crate::metrics::Counters;
use crate::notes::{NoteComposer, NoteParts};
use crate::ops::PickOps;
use crate::roster::Roster;
use crate::wms::types::FulfillmentOrder;
use crate::wms::{WmsApi, WmsError};

#[derive(Debug, Default)]
pub struct Buckets {
    /// Every order of this priority band; batching filters further.
    pub for_batches: Vec<FulfillmentOrder>,
    /// Cart-eligible orders containing Seni products.
    pub seni_carts: Vec<FulfillmentOrder>,
    /// Cart-eligible orders without Seni products.
    pub other_carts: Vec<FulfillmentOrder>,
}

#[derive(Debug, Default)]
pub struct Separation {
    pub prio: Buckets,
    pub non_prio: Buckets,
    /// All pickable orders observed, single picks included; drives the
    /// running-dry flag.
    pub orders_count: usize,
}

impl Separation {
    pub fn is_running_dry(&self) -> bool {
        self.orders_count < config::RUNNING_DRY_NUM_ORDERS
    }
}

/// A picker category with its outstanding-picks tally. New picks go to
/// whoever has the fewest open ones.
struct PickerPool {
    pickers: Vec<i64>,
    outstanding: HashMap<i64, usize>,
}

impl PickerPool {
    async fn load(ops: &PickOps<'_>, pickers: &[i64]) -> Self {
        let mut outstanding = HashMap::new();
        for user_id in pickers {
            outstanding.insert(*user_id, ops.picks_for_user(*user_id).await);
        }
        Self {
            pickers: pickers.to_vec(),
            outstanding,
        }
    }

    /// Assignment list plus the chosen picker. Zero or one roster entries
    /// attach the roster as-is; with more, the least-loaded picker wins
    /// (ties by id for determinism).
    fn choose(&self) -> (Vec<i64>, Option<i64>) {
        if self.pickers.len() <= 1 {
            return (self.pickers.clone(), self.pickers.first().copied());
        }
        let picker = self
            .pickers
            .iter()
            .copied()
            .min_by_key(|id| (self.outstanding.get(id).copied().unwrap_or(0), *id));
        (picker.into_iter().collect(), picker)
    }

    fn bump(&mut self, user_id: i64) {
        *self.outstanding.entry(user_id).or_insert(0) += 1;
    }
}

enum RosterKind {
    Partnerkunde,
    Palettenversand,
}

pub struct Separator<'a> {
    ops: &'a PickOps<'a>,
    now: DateTime<Tz>,
    is_sweeping_time: bool,
    skus_to_batch: &'a SkusToBatch,
    partnerkunde: PickerPool,
    palettenversand: PickerPool,
}

impl<'a> Separator<'a> {
    pub async fn new(
        ops: &'a PickOps<'a>,
        now: DateTime<Tz>,
        is_sweeping_time: bool,
        skus_to_batch: &'a SkusToBatch,
        roster: &Roster,
    ) -> Separator<'a> {
        Separator {
            ops,
            now,
            is_sweeping_time,
            skus_to_batch,
            partnerkunde: PickerPool::load(ops, &roster.partnerkunden).await,
            palettenversand: PickerPool::load(ops, &roster.palettenversand).await,
        }
    }

    #[instrument(skip(self, ctx), target = "separator", fields(sweeping = self.is_sweeping_time))]
    pub async fn run(&mut self, ctx: &mut RunContext) -> Result<Separation, WmsError> {
        let orders = self.ops.api.queued_fulfillments().await?;
        let mut separation = Separation::default();

        for order in orders {
            if !classify::suitable_for_picking(&order) {
                continue;
            }
            if !ctx.all_items_available(&order) {
                Counters::bump(&self.ops.counters.orders_unavailable);
                debug!(order = order.sales_order_id, "not enough stock, skipped");
                continue;
            }

            separation.orders_count += 1;

            let prio = classify::is_prio(&self.now, &order);
            let contains_seni = classify::contains_seni(&order);
            let for_carts =
                classify::suitable_for_carts(&order, self.is_sweeping_time, self.skus_to_batch);

            if self.try_single_pick(&order, prio, ctx).await {
                continue;
            }

            let buckets = if prio {
                &mut separation.prio
            } else {
                &mut separation.non_prio
            };
            buckets.for_batches.push(order.clone());
            if for_carts {
                if contains_seni {
                    buckets.seni_carts.push(order);
                } else {
                    buckets.other_carts.push(order);
                }
            }
        }

        warn!(
            orders = separation.orders_count,
            prio_batches = separation.prio.for_batches.len(),
            prio_seni = separation.prio.seni_carts.len(),
            prio_other = separation.prio.other_carts.len(),
            batches = separation.non_prio.for_batches.len(),
            seni = separation.non_prio.seni_carts.len(),
            other = separation.non_prio.other_carts.len(),
            "orders separated"
        );
        Ok(separation)
    }

    /// Emits a single pick when one of the single-pick rules applies.
    /// Returns whether the order was consumed.
    async fn try_single_pick(
        &mut self,
        order: &FulfillmentOrder,
        is_prio: bool,
        ctx: &mut RunContext,
    ) -> bool {
        if classify::is_partnerkunde(order) {
            warn!(order = order.sales_order_id, "order is Partnerkunde");
            self.create_assigned(order, RosterKind::Partnerkunde, is_prio, None, ctx)
                .await;
            return true;
        }

        if order.priority > config::NORMAL_PRIORITY_VALUE {
            warn!(order = order.sales_order_id, priority = order.priority, "order is prio");
            let composer = NoteComposer {
                now: self.now,
                orders: std::slice::from_ref(order),
                is_prio: false,
                is_batch: false,
                is_sweeping_time: false,
            };
            let note = composer.compose(
                &[order.sales_order_id],
                NoteParts {
                    single_order: Some(order),
                    ..Default::default()
                },
            );
            self.ops
                .create_picking(&[order.sales_order_id], &note, false, &[])
                .await;
            Counters::bump(&self.ops.counters.singles_created);
            ctx.mark_processed([order.sales_order_id]);
            ctx.consume_order(order);
            return true;
        }

        let palette_sized = classify::label_share(order) >= config::PALETTE_LABEL_SHARE;
        let special_shipping = order
            .shipping_method_id
            .is_some_and(|m| config::SPECIAL_SHIPPING_METHODS.contains(&m));
        if palette_sized || special_shipping {
            warn!(order = order.sales_order_id, "order is palette");
            self.create_assigned(
                order,
                RosterKind::Palettenversand,
                is_prio,
                Some(config::NOTE_PALETTE),
                ctx,
            )
            .await;
            return true;
        }

        false
    }

    /// Single pick routed to the least-loaded picker of a category.
    /// Sweeping time plays no role here: these picks have no upper bound
    /// and always hold exactly one order.
    async fn create_assigned(
        &mut self,
        order: &FulfillmentOrder,
        kind: RosterKind,
        is_prio: bool,
        size_note: Option<&str>,
        ctx: &mut RunContext,
    ) {
        let (pickers, chosen) = match kind {
            RosterKind::Partnerkunde => self.partnerkunde.choose(),
            RosterKind::Palettenversand => self.palettenversand.choose(),
        };

        let composer = NoteComposer {
            now: self.now,
            orders: std::slice::from_ref(order),
            is_prio,
            is_batch: false,
            is_sweeping_time: false,
        };
        let note = composer.compose(
            &[order.sales_order_id],
            NoteParts {
                single_order: Some(order),
                size_note,
                ..Default::default()
            },
        );

        self.ops
            .create_picking(&[order.sales_order_id], &note, false, &pickers)
            .await;
        Counters::bump(&self.ops.counters.singles_created);
        ctx.mark_processed([order.sales_order_id]);
        ctx.consume_order(order);

        if let Some(picker) = chosen {
            match kind {
                RosterKind::Partnerkunde => self.partnerkunde.bump(picker),
                RosterKind::Palettenversand => self.palettenversand.bump(picker),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roster_attaches_nothing() {
        let pool = PickerPool {
            pickers: vec![],
            outstanding: HashMap::new(),
        };
        let (pickers, chosen) = pool.choose();
        assert!(pickers.is_empty());
        assert!(chosen.is_none());
    }

    #[test]
    fn single_roster_entry_is_attached_as_is() {
        let pool = PickerPool {
            pickers: vec![42],
            outstanding: HashMap::from([(42, 5)]),
        };
        let (pickers, chosen) = pool.choose();
        assert_eq!(pickers, vec![42]);
        assert_eq!(chosen, Some(42));
    }

    #[test]
    fn least_loaded_picker_wins() {
        let pool = PickerPool {
            pickers: vec![1, 2, 3],
            outstanding: HashMap::from([(1, 4), (2, 1), (3, 2)]),
        };
        let (pickers, chosen) = pool.choose();
        assert_eq!(pickers, vec![2]);
        assert_eq!(chosen, Some(2));
    }

    #[test]
    fn load_ties_break_by_id() {
        let pool = PickerPool {
            pickers: vec![9, 4],
            outstanding: HashMap::from([(9, 1), (4, 1)]),
        };
        let (pickers, _) = pool.choose();
        assert_eq!(pickers, vec![4]);
    }
}
