//! Shelf index and product availability, built from one full stock scan.
//!
//! Only the four picking zones contribute; stock parked in reception or at
//! packing stations is invisible to the planners. The fold itself is pure
//! so the zone filter and shelf derivation are testable without I/O.

use std::collections::{HashMap, HashSet};

use tracing::{info, instrument, warn};

use crate::config;
use crate::wms::WmsApi;
use crate::wms::WmsError;
use crate::wms::types::StockRecord;

/// shelf code -> product ids present on that shelf.
pub type ShelvesIndex = HashMap<String, HashSet<i64>>;

#[derive(Debug, Default)]
pub struct StockTopology {
    pub shelves: ShelvesIndex,
    /// product id -> summed available quantity in the picking zones.
    pub availability: HashMap<i64, i64>,
}

/// Folds stock records into the topology. Records without a product id,
/// location code or allowed zone are skipped with a log.
pub fn fold_stock<I>(records: I) -> StockTopology
where
    I: IntoIterator<Item = StockRecord>,
{
    let mut topology = StockTopology::default();

    for record in records {
        let in_picking_zone = record
            .location
            .zone_id
            .is_some_and(|z| config::WAREHOUSE_ZONES_ALLOWED_FOR_PICKING.contains(&z));
        if !in_picking_zone {
            continue;
        }

        let Some(product_id) = record.product_id() else {
            warn!("stock record without product id skipped");
            continue;
        };
        let Some(code) = record.location.code.as_deref() else {
            warn!(product_id, "stock record without location code skipped");
            continue;
        };

        let shelf: String = code.chars().take(config::SHELF_NAME_LENGTH).collect();
        topology.shelves.entry(shelf).or_default().insert(product_id);

        *topology.availability.entry(product_id).or_insert(0) += record.quantity.unwrap_or(0);
    }

    topology
}

#[instrument(skip(api), target = "shelves")]
pub async fn build_topology(api: &dyn WmsApi) -> Result<StockTopology, WmsError> {
    let records = api.stock_records().await?;
    let topology = fold_stock(records);
    info!(
        shelves = topology.shelves.len(),
        products = topology.availability.len(),
        "stock topology built"
    );
    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stock(value: serde_json::Value) -> StockRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn shelf_is_first_six_characters_of_the_code() {
        let topology = fold_stock(vec![stock(json!({
            "product_id": 5,
            "quantity": 12,
            "location": {"zone_id": 1419, "code": "H1-111-1-2-1-1"},
        }))]);
        assert!(topology.shelves["H1-111"].contains(&5));
        assert_eq!(topology.availability[&5], 12);
    }

    #[test]
    fn quantities_sum_across_locations_and_zones() {
        let topology = fold_stock(vec![
            stock(json!({
                "product_id": 5,
                "quantity": 12,
                "location": {"zone_id": 1419, "code": "H1-111-1-1-1-1"},
            })),
            stock(json!({
                "product_id": 5,
                "quantity": 8,
                "location": {"zone_id": 1423, "code": "H2-040-1-1-1-1"},
            })),
        ]);
        assert_eq!(topology.availability[&5], 20);
        assert!(topology.shelves["H1-111"].contains(&5));
        assert!(topology.shelves["H2-040"].contains(&5));
    }

    #[test]
    fn non_picking_zones_are_ignored() {
        let topology = fold_stock(vec![stock(json!({
            "product_id": 5,
            "quantity": 12,
            "location": {"zone_id": 9999, "code": "PACK41"},
        }))]);
        assert!(topology.shelves.is_empty());
        assert!(topology.availability.is_empty());
    }

    #[test]
    fn malformed_records_are_skipped_not_fatal() {
        let topology = fold_stock(vec![
            stock(json!({"quantity": 3, "location": {"zone_id": 1419, "code": "H1-111-1"}})),
            stock(json!({"product_id": 6, "quantity": 3, "location": {"zone_id": 1419}})),
            stock(json!({
                "product_id": 7,
                "quantity": 3,
                "location": {"zone_id": 1419, "code": "H3-001-2"},
            })),
        ]);
        assert_eq!(topology.availability.len(), 1);
        assert_eq!(topology.availability[&7], 3);
    }
}
