//! Note grammar for picking orders.
//!
//! Every emitted pick carries a `Bot:`-prefixed note assembled from fixed
//! building blocks in a fixed order, so floor staff can read urgency, cart
//! class and routing at a glance. The composer is pure; it looks at the
//! orders behind the pick only to detect Seni content.

use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use tracing::debug;

use crate::classify;
use crate::clock::is_working_day;
use crate::config;
use crate::wms::types::FulfillmentOrder;

pub struct NoteComposer<'a> {
    pub now: DateTime<Tz>,
    /// Orders the pick draws from; consulted by id for Seni detection.
    pub orders: &'a [FulfillmentOrder],
    pub is_prio: bool,
    pub is_batch: bool,
    pub is_sweeping_time: bool,
}

/// Optional building blocks of one note.
#[derive(Default)]
pub struct NoteParts<'a> {
    pub single_order: Option<&'a FulfillmentOrder>,
    pub size_note: Option<&'a str>,
    /// Batch output only: total quantity and product name.
    pub batched: Option<(i64, &'a str)>,
    /// Shelf cart only.
    pub shelf: Option<&'a str>,
}

impl NoteComposer<'_> {
    /// Assembles the note for a pick over `ids`. Token order is fixed;
    /// blocks that do not apply are skipped.
    pub fn compose(&self, ids: &[i64], parts: NoteParts<'_>) -> String {
        let mut tokens: Vec<String> = vec![config::BASE_NOTE.to_string()];

        let size_note = parts.size_note.map(str::to_string).or_else(|| {
            parts
                .single_order
                .map(|o| classify::size_note_for(classify::label_share(o)).to_string())
        });

        if self.contains_seni_products(ids) {
            tokens.push(config::NOTE_SENI.to_string());
        }

        match parts.single_order {
            Some(order) if order.priority > config::NORMAL_PRIORITY_VALUE => {
                tokens.push(format!("{} {}", config::NOTE_PRIO, order.priority));
            }
            _ if self.is_prio => tokens.push(self.priority_base().to_string()),
            _ => {}
        }

        if self.is_batch {
            tokens.push(config::NOTE_BATCH.to_string());
        }

        if let Some(label) = parts.single_order.and_then(special_shipping_label) {
            tokens.push(label.to_string());
        }

        if parts.single_order.is_some_and(classify::is_partnerkunde) {
            tokens.push(config::NOTE_PARTNERKUNDE.to_string());
        }

        if self.is_sweeping_time && self.is_prio {
            tokens.push(config::NOTE_SWEEPER.to_string());
        }

        if let Some(size) = size_note {
            tokens.push(size);
        }

        if let Some((quantity, product)) = parts.batched {
            tokens.push(format!("{quantity} {product}"));
        }

        if let Some(shelf) = parts.shelf.filter(|s| !s.is_empty()) {
            tokens.push(shelf.to_string());
        }

        if self.is_sweeping_time && self.is_prio {
            tokens.push(ids.len().to_string());
        }

        let note = tokens.join(" ");
        debug!(note, "note composed");
        note
    }

    /// `Vortag` inside the yesterday band and on non-working days,
    /// `PLZ 1-4` otherwise.
    fn priority_base(&self) -> &'static str {
        let hour = self.now.hour();
        let in_band = (config::YESTERDAY_ORDERS_START_TIME..=config::YESTERDAY_ORDERS_END_TIME)
            .contains(&hour);
        if in_band || !is_working_day(&self.now) {
            config::NOTE_YESTERDAY
        } else {
            config::NOTE_PLZ_FAR_RANGE
        }
    }

    fn contains_seni_products(&self, ids: &[i64]) -> bool {
        ids.iter().any(|id| {
            self.orders
                .iter()
                .any(|o| o.sales_order_id == *id && classify::contains_seni(o))
        })
    }
}

fn special_shipping_label(order: &FulfillmentOrder) -> Option<&'static str> {
    match order.shipping_method_id? {
        config::ABHOLUNG => Some(config::NOTE_ABHOLUNG),
        config::DB_SCHENKER => Some(config::NOTE_DB_SCHENKER),
        config::ALTRUAN_LIEFERDIENST => Some(config::NOTE_ALTRUAN_LIEFERDIENST),
        config::DB_SCHENKER_EUROPALETTE => Some(config::NOTE_PALETTE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::berlin;
    use serde_json::json;

    fn order(value: serde_json::Value) -> FulfillmentOrder {
        serde_json::from_value(value).unwrap()
    }

    fn composer<'a>(
        orders: &'a [FulfillmentOrder],
        is_prio: bool,
        is_batch: bool,
        is_sweeping_time: bool,
    ) -> NoteComposer<'a> {
        NoteComposer {
            // Wednesday, 10:00 — inside the yesterday band.
            now: berlin(2024, 10, 2, 10, 0),
            orders,
            is_prio,
            is_batch,
            is_sweeping_time,
        }
    }

    #[test]
    fn palette_single_pick_note() {
        let orders = vec![order(json!({
            "sales_order_id": 11,
            "shipping_method_id": 605,
            "criterium": "LA_9_0",
        }))];
        let note = composer(&orders, false, false, false).compose(
            &[11],
            NoteParts {
                single_order: Some(&orders[0]),
                size_note: Some(config::NOTE_PALETTE),
                ..Default::default()
            },
        );
        assert_eq!(note, "Bot: Palette Palette");
    }

    #[test]
    fn partnerkunde_note_derives_size() {
        let orders = vec![order(json!({
            "sales_order_id": 12,
            "channel": "Partnerkunde (netto)",
            "criterium": "LA_0_5",
        }))];
        let note = composer(&orders, false, false, false).compose(
            &[12],
            NoteParts {
                single_order: Some(&orders[0]),
                ..Default::default()
            },
        );
        assert_eq!(
            note,
            "Bot: Partnerkunde (Bitte Lieferschein ausdrucken) M1 (bis 0.5)"
        );
    }

    #[test]
    fn elevated_priority_outranks_planner_prio_flag() {
        let orders = vec![order(json!({
            "sales_order_id": 13,
            "priority": 3,
            "criterium": "LA_0_25",
        }))];
        let note = composer(&orders, true, false, false).compose(
            &[13],
            NoteParts {
                single_order: Some(&orders[0]),
                ..Default::default()
            },
        );
        assert_eq!(note, "Bot: PRIO 3 S (bis 0.25)");
    }

    #[test]
    fn batch_note_with_quantity_and_product() {
        let orders = vec![order(json!({"sales_order_id": 14, "criterium": "LA_0_5"}))];
        let note = composer(&orders, false, true, false).compose(
            &[14],
            NoteParts {
                batched: Some((120, "Seni Soft 60x90")),
                ..Default::default()
            },
        );
        // No Seni token: the order itself has no Seni items, only the
        // batched product name mentions it.
        assert_eq!(note, "Bot: Batch 120 Seni Soft 60x90");
    }

    #[test]
    fn sweeping_priority_cart_carries_rest_and_count() {
        let orders = vec![
            order(json!({"sales_order_id": 21, "criterium": "LA_1_0"})),
            order(json!({"sales_order_id": 22, "criterium": "LA_1_0"})),
        ];
        let note = composer(&orders, true, false, true).compose(
            &[21, 22],
            NoteParts {
                size_note: Some(config::NOTE_M2),
                ..Default::default()
            },
        );
        assert_eq!(note, "Bot: Vortag Rest M2 (bis 1) 2");
    }

    #[test]
    fn evening_priority_cart_uses_plz_token() {
        let orders = vec![order(json!({"sales_order_id": 23, "criterium": "LA_1_0"}))];
        let mut c = composer(&orders, true, false, false);
        c.now = berlin(2024, 10, 2, 16, 0);
        let note = c.compose(
            &[23],
            NoteParts {
                size_note: Some(config::NOTE_M2),
                ..Default::default()
            },
        );
        assert_eq!(note, "Bot: PLZ 1-4 M2 (bis 1)");
    }

    #[test]
    fn shelf_cart_note_with_seni() {
        let orders = vec![
            order(json!({
                "sales_order_id": 31,
                "criterium": "LA_0_5",
                "items": [{"product": {"id": 1, "name": "Seni Care"}}],
            })),
            order(json!({"sales_order_id": 32, "criterium": "LA_0_5"})),
        ];
        let note = composer(&orders, false, false, false).compose(
            &[31, 32],
            NoteParts {
                size_note: Some(config::NOTE_M1),
                shelf: Some("H1-111"),
                ..Default::default()
            },
        );
        assert_eq!(note, "Bot: Seni M1 (bis 0.5) H1-111");
    }

    #[test]
    fn every_note_starts_with_the_base_literal() {
        let orders = vec![order(json!({"sales_order_id": 41}))];
        let note = composer(&orders, false, false, false).compose(&[41], NoteParts::default());
        assert!(note.starts_with("Bot:"));
    }
}
