//! Order classification.
//!
//! Pure functions over a single order and the run's pinned wall-clock
//! instant. The orchestrator samples the clock once, so classifying the
//! same order twice within a run always yields the same result, regardless
//! of planner ordering.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike};
use chrono_tz::Tz;
use tracing::warn;

use crate::clock::is_working_day;
use crate::config::{
    self, PackageSize, SkusToBatch,
};
use crate::wms::types::{FulfillmentOrder, Item};

/// Label share encoded in the `LA_<a>_<b>` tag of `criterium`
/// (`LA_0_5` -> 0.5). Missing or malformed tags decode to 0.0.
pub fn label_share(order: &FulfillmentOrder) -> f64 {
    let Some(criterium) = order.criterium.as_deref() else {
        return 0.0;
    };
    for tag in criterium.split(',') {
        if tag.trim().starts_with(config::TAG_IDENTIFIER_LABEL_SHARE) {
            match decode_label_share_tag(tag.trim()) {
                Some(value) => return value,
                None => {
                    warn!(order = order.sales_order_id, tag, "malformed label-share tag");
                }
            }
        }
    }
    0.0
}

pub fn decode_label_share_tag(tag: &str) -> Option<f64> {
    let rest = tag.strip_prefix(config::TAG_IDENTIFIER_LABEL_SHARE)?;
    let (whole, frac) = rest.split_once('_')?;
    format!("{whole}.{frac}").parse().ok()
}

/// Size-bucket note for a label share; orders without a usable tag ship as
/// palettes.
pub fn size_note_for(label_share: f64) -> &'static str {
    if label_share > 0.0 {
        bucket_for(label_share).note()
    } else {
        config::NOTE_PALETTE
    }
}

pub fn bucket_for(label_share: f64) -> PackageSize {
    if label_share <= 0.25 {
        PackageSize::S
    } else if label_share <= 0.5 {
        PackageSize::M1
    } else if label_share <= 1.0 {
        PackageSize::M2
    } else if label_share <= 3.0 {
        PackageSize::L
    } else if label_share <= 9.0 {
        PackageSize::Xl
    } else {
        PackageSize::Xxl
    }
}

/// Bucket used by the cart planners to pool orders of one trolley class.
/// Orders without a label share never join a cart.
pub fn cart_bucket_for(label_share: f64) -> Option<PackageSize> {
    (label_share > 0.0).then(|| bucket_for(label_share))
}

/// Priority classification; three mutually exclusive hour bands.
///
/// Before the yesterday band: far-range German orders that are already
/// late. Inside the band (or on non-working days): every late order.
/// After the band: far-range German orders, late or not, pulled forward
/// for next-morning delivery.
pub fn is_prio(now: &DateTime<Tz>, order: &FulfillmentOrder) -> bool {
    let hour = now.hour();
    let working = is_working_day(now);
    let late = is_past_delivery_date(now, order);
    let far = is_far_range_germany(order);

    if hour < config::YESTERDAY_ORDERS_START_TIME && working && far && late {
        return true;
    }
    let in_band = (config::YESTERDAY_ORDERS_START_TIME..=config::YESTERDAY_ORDERS_END_TIME)
        .contains(&hour);
    if (in_band || !working) && late {
        return true;
    }
    if hour > config::YESTERDAY_ORDERS_END_TIME && working && far {
        return true;
    }
    false
}

fn is_far_range_germany(order: &FulfillmentOrder) -> bool {
    let address = &order.ship_to.address;
    if address.country_code.as_deref() != Some(config::GERMANY_COUNTRY_CODE) {
        return false;
    }
    address
        .zip
        .as_deref()
        .and_then(|zip| zip.chars().next())
        .is_some_and(|first| config::PLZ_FAR_RANGE.contains(&first))
}

/// The stored delivery date lags warehouse wall clock; after the timezone
/// correction, any delivery date on a previous day counts as late.
pub fn is_past_delivery_date(now: &DateTime<Tz>, order: &FulfillmentOrder) -> bool {
    let Some(raw) = order.delivery_date.as_deref() else {
        return false;
    };
    let Ok(parsed) = NaiveDateTime::parse_from_str(raw, config::DELIVERY_DATE_FORMAT) else {
        warn!(order = order.sales_order_id, raw, "unparseable delivery date");
        return false;
    };
    let corrected = parsed + TimeDelta::hours(config::CORRECTION_HOURS);
    corrected.date() < now.date_naive()
}

pub fn item_is_seni(item: &Item) -> bool {
    if item
        .product
        .product_categories
        .iter()
        .any(|c| c.id == config::TZMO_MANUFACTURER)
    {
        return true;
    }
    item.product
        .name
        .as_deref()
        .is_some_and(|name| name.contains(config::SENI_PRODUCTS_IDENTIFIER))
}

pub fn contains_seni(order: &FulfillmentOrder) -> bool {
    order.items.iter().any(item_is_seni)
}

/// Cart eligibility. During sweeping time everything goes on a cart;
/// otherwise special-SKU, palette-sized and special-shipping orders are
/// kept out.
pub fn suitable_for_carts(
    order: &FulfillmentOrder,
    is_sweeping_time: bool,
    skus_to_batch: &SkusToBatch,
) -> bool {
    if is_sweeping_time {
        return true;
    }
    for item in &order.items {
        if item
            .product
            .sku
            .as_deref()
            .is_some_and(|sku| skus_to_batch.contains_sku(sku))
        {
            return false;
        }
    }
    if label_share(order) >= config::PALETTE_LABEL_SHARE {
        return false;
    }
    if order
        .shipping_method_id
        .is_some_and(|m| config::SPECIAL_SHIPPING_METHODS.contains(&m))
    {
        return false;
    }
    true
}

pub fn suitable_for_picking(order: &FulfillmentOrder) -> bool {
    order.state.as_deref() == Some(config::QUEUE_STATE)
}

pub fn is_partnerkunde(order: &FulfillmentOrder) -> bool {
    order
        .channel
        .as_deref()
        .is_some_and(|c| config::PARTNERKUNDE_SALES_CHANNELS.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::berlin;
    use serde_json::json;

    fn order(value: serde_json::Value) -> FulfillmentOrder {
        serde_json::from_value(value).unwrap()
    }

    fn far_range_order(delivery_date: Option<&str>) -> FulfillmentOrder {
        order(json!({
            "sales_order_id": 1,
            "state": "queue",
            "delivery_date": delivery_date,
            "ship_to": {"address": {"zip": "34117", "country_code": "276"}},
        }))
    }

    #[test]
    fn label_share_decoding() {
        assert_eq!(decode_label_share_tag("LA_0_5"), Some(0.5));
        assert_eq!(decode_label_share_tag("LA_12_25"), Some(12.25));
        assert_eq!(decode_label_share_tag("LA_9"), None);
        assert_eq!(decode_label_share_tag("XX_0_5"), None);

        let o = order(json!({
            "sales_order_id": 1,
            "criterium": "EXPRESS,LA_2_0,OTHER",
        }));
        assert_eq!(label_share(&o), 2.0);

        let o = order(json!({"sales_order_id": 1}));
        assert_eq!(label_share(&o), 0.0);
    }

    #[test]
    fn size_buckets_ascend_by_threshold() {
        assert_eq!(bucket_for(0.25), PackageSize::S);
        assert_eq!(bucket_for(0.3), PackageSize::M1);
        assert_eq!(bucket_for(0.5), PackageSize::M1);
        assert_eq!(bucket_for(1.0), PackageSize::M2);
        assert_eq!(bucket_for(3.0), PackageSize::L);
        assert_eq!(bucket_for(9.0), PackageSize::Xl);
        assert_eq!(bucket_for(9.5), PackageSize::Xxl);
    }

    #[test]
    fn missing_label_share_means_palette_note_and_no_cart() {
        assert_eq!(size_note_for(0.0), config::NOTE_PALETTE);
        assert_eq!(cart_bucket_for(0.0), None);
        assert_eq!(cart_bucket_for(0.5), Some(PackageSize::M1));
    }

    #[test]
    fn morning_band_needs_far_range_and_late() {
        // 2024-10-02 is a Wednesday; band starts at 9.
        let now = berlin(2024, 10, 2, 7, 0);
        let late = far_range_order(Some("2024-09-30T10:00:00"));
        assert!(is_prio(&now, &late));

        let on_time = far_range_order(Some("2024-10-05T10:00:00"));
        assert!(!is_prio(&now, &on_time));

        let mut near_range = far_range_order(Some("2024-09-30T10:00:00"));
        near_range.ship_to.address.zip = Some("70173".to_string());
        assert!(!is_prio(&now, &near_range));
    }

    #[test]
    fn midday_band_only_needs_lateness() {
        let now = berlin(2024, 10, 2, 10, 0);
        let mut late = far_range_order(Some("2024-09-30T10:00:00"));
        late.ship_to.address.zip = Some("70173".to_string());
        assert!(is_prio(&now, &late), "any late order is prio in the band");

        let on_time = far_range_order(Some("2024-10-02T10:00:00"));
        assert!(!is_prio(&now, &on_time));
    }

    #[test]
    fn weekend_counts_as_in_band() {
        // Saturday evening, late order, near-range zip.
        let now = berlin(2024, 10, 5, 20, 0);
        let mut late = far_range_order(Some("2024-09-30T10:00:00"));
        late.ship_to.address.zip = Some("70173".to_string());
        assert!(is_prio(&now, &late));
    }

    #[test]
    fn evening_band_needs_far_range_only() {
        let now = berlin(2024, 10, 2, 16, 0);
        let on_time = far_range_order(Some("2024-10-09T10:00:00"));
        assert!(is_prio(&now, &on_time));

        let mut near_range = far_range_order(None);
        near_range.ship_to.address.zip = Some("70173".to_string());
        assert!(!is_prio(&now, &near_range));
    }

    #[test]
    fn delivery_date_correction_crosses_midnight() {
        // 23:00 stored on Oct 1 is 01:00 Oct 2 after correction, so the
        // order is not late on Oct 2.
        let now = berlin(2024, 10, 2, 10, 0);
        let o = far_range_order(Some("2024-10-01T23:00:00"));
        assert!(!is_past_delivery_date(&now, &o));

        let o = far_range_order(Some("2024-10-01T10:00:00"));
        assert!(is_past_delivery_date(&now, &o));
    }

    #[test]
    fn classification_is_idempotent() {
        let now = berlin(2024, 10, 2, 10, 0);
        let o = far_range_order(Some("2024-09-30T10:00:00"));
        assert_eq!(is_prio(&now, &o), is_prio(&now, &o));
        assert_eq!(label_share(&o), label_share(&o));
        assert_eq!(contains_seni(&o), contains_seni(&o));
    }

    #[test]
    fn seni_by_category_or_name() {
        let by_category = order(json!({
            "sales_order_id": 1,
            "items": [{"product": {"id": 5, "name": "Windeln", "product_categories": [{"id": 6468}]}}],
        }));
        assert!(contains_seni(&by_category));

        let by_name = order(json!({
            "sales_order_id": 1,
            "items": [{"product": {"id": 5, "name": "Seni Soft Basic"}}],
        }));
        assert!(contains_seni(&by_name));

        let neither = order(json!({
            "sales_order_id": 1,
            "items": [{"product": {"id": 5, "name": "Handschuhe", "product_categories": [{"id": 99}]}}],
        }));
        assert!(!contains_seni(&neither));
    }

    #[test]
    fn cart_suitability_rules() {
        let skus = SkusToBatch::from_entries(&[("SPEC-1", 42, 10)]);

        let special_sku = order(json!({
            "sales_order_id": 1,
            "criterium": "LA_0_5",
            "items": [{"product": {"id": 42, "sku": "SPEC-1"}}],
        }));
        assert!(!suitable_for_carts(&special_sku, false, &skus));
        assert!(suitable_for_carts(&special_sku, true, &skus));

        let palette = order(json!({"sales_order_id": 1, "criterium": "LA_9_0"}));
        assert!(!suitable_for_carts(&palette, false, &skus));

        let special_shipping = order(json!({
            "sales_order_id": 1,
            "criterium": "LA_0_5",
            "shipping_method_id": 665,
        }));
        assert!(!suitable_for_carts(&special_shipping, false, &skus));

        let plain = order(json!({
            "sales_order_id": 1,
            "criterium": "LA_0_5",
            "shipping_method_id": 1,
            "items": [{"product": {"id": 7, "sku": "PLAIN"}}],
        }));
        assert!(suitable_for_carts(&plain, false, &skus));
    }

    #[test]
    fn only_queued_orders_are_pickable() {
        assert!(suitable_for_picking(&order(
            json!({"sales_order_id": 1, "state": "queue"})
        )));
        assert!(!suitable_for_picking(&order(
            json!({"sales_order_id": 1, "state": "taken"})
        )));
        assert!(!suitable_for_picking(&order(json!({"sales_order_id": 1}))));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Decoding `LA_<a>_<b>` always yields float(`a.b`).
        #[test]
        fn label_share_round_trip(a in 0u32..1000, b in 0u32..1000) {
            let tag = format!("LA_{a}_{b}");
            let decoded = decode_label_share_tag(&tag).expect("tag must decode");
            let expected: f64 = format!("{a}.{b}").parse().expect("valid float literal");
            prop_assert_eq!(decoded, expected);
        }

        /// Every positive label share lands in exactly one bucket, and the
        /// bucket is monotone in the share.
        #[test]
        fn buckets_are_monotone(x in 0.01f64..20.0, y in 0.01f64..20.0) {
            let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
            let order = [
                PackageSize::S,
                PackageSize::M1,
                PackageSize::M2,
                PackageSize::L,
                PackageSize::Xl,
                PackageSize::Xxl,
            ];
            let pos = |s: PackageSize| order.iter().position(|b| *b == s).unwrap();
            prop_assert!(pos(bucket_for(lo)) <= pos(bucket_for(hi)));
        }
    }
}
