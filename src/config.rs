//! Configuration for the picking orchestrator.
//!
//! Two layers live here:
//! - `AppConfig`: per-deployment values read from the environment once at
//!   startup (credentials, endpoints, tuning knobs).
//! - Domain constants: shipping-method ids, warehouse zones, note literals
//!   and the trolley size table. These encode warehouse operating rules and
//!   change together with the floor layout, not per deployment.

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

// =========================
// Shipping methods
// =========================
pub const ALTRUAN_LIEFERDIENST: i64 = 807;
pub const ABHOLUNG: i64 = 665;
pub const PALETTENVERSAND: i64 = 604;
pub const DB_SCHENKER: i64 = 605;
pub const DB_SCHENKER_EUROPALETTE: i64 = 1097;

/// Shipping methods that force a single assigned palette pick and exclude
/// an order from cart creation.
pub const SPECIAL_SHIPPING_METHODS: [i64; 5] = [
    ALTRUAN_LIEFERDIENST,
    ABHOLUNG,
    PALETTENVERSAND,
    DB_SCHENKER,
    DB_SCHENKER_EUROPALETTE,
];

// =========================
// General
// =========================
pub const QUEUE_STATE: &str = "queue";
pub const TAG_IDENTIFIER_LABEL_SHARE: &str = "LA_";
pub const NIGHT_CLEANING_HOURS: [u32; 2] = [2, 3];
pub const PICKERS_UPDATE_HOURS: std::ops::RangeInclusive<u32> = 4..=17;
pub const SWEEPING_HOURS: std::ops::RangeInclusive<u32> = 5..=17;

/// Below this many queued orders the warehouse counts as running dry and
/// minimum batch / cart thresholds are scaled down.
pub const RUNNING_DRY_NUM_ORDERS: usize = 100;
pub const RUNNING_DRY_DENOMINATOR: f64 = 0.1;

// =========================
// Shelves index
// =========================
pub const H1_ZONE_ID: i64 = 1419;
pub const H2_ZONE_ID: i64 = 1423;
pub const H3_ZONE_ID: i64 = 1472;
pub const CROSSDOCKING_ZONE_ID: i64 = 1417;

/// Stock in any other zone (reception, packing stations, ...) is invisible
/// to the planners.
pub const WAREHOUSE_ZONES_ALLOWED_FOR_PICKING: [i64; 4] =
    [H1_ZONE_ID, H2_ZONE_ID, H3_ZONE_ID, CROSSDOCKING_ZONE_ID];

/// A shelf is the first six characters of a location code
/// (`H1-111-1-2-1-1` -> `H1-111`).
pub const SHELF_NAME_LENGTH: usize = 6;
pub const SHELVES_INDEX_PAGE_LENGTH: usize = 3000;

// =========================
// Notes
// =========================
pub const BASE_NOTE: &str = "Bot:";
pub const NOTE_BATCH: &str = "Batch";
pub const NOTE_PLZ_FAR_RANGE: &str = "PLZ 1-4";
pub const NOTE_YESTERDAY: &str = "Vortag";
pub const NOTE_SWEEPER: &str = "Rest";
pub const NOTE_SENI: &str = "Seni";
pub const NOTE_PRIO: &str = "PRIO";

pub const NOTE_S: &str = "S (bis 0.25)";
pub const NOTE_M1: &str = "M1 (bis 0.5)";
pub const NOTE_M2: &str = "M2 (bis 1)";
pub const NOTE_L: &str = "L (bis 3)";
pub const NOTE_XL: &str = "XL (ab 3)";

pub const NOTE_ALTRUAN_LIEFERDIENST: &str = "Altruan Lieferdienst";
pub const NOTE_ABHOLUNG: &str = "Abholung";
pub const NOTE_DB_SCHENKER: &str = "Palette";
pub const NOTE_PALETTE: &str = "Palette";
pub const NOTE_PARTNERKUNDE: &str = "Partnerkunde (Bitte Lieferschein ausdrucken)";

// =========================
// Separation
// =========================
pub const DELIVERY_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Stored delivery dates lag warehouse wall clock by two hours.
pub const CORRECTION_HOURS: i64 = 2;
pub const NORMAL_PRIORITY_VALUE: i64 = 1;
pub const GERMANY_COUNTRY_CODE: &str = "276";
pub const PLZ_FAR_RANGE: [char; 4] = ['1', '2', '3', '4'];

/// Hour bands for the priority rules: before `YESTERDAY_ORDERS_START_TIME`
/// only far-range late orders are urgent, inside the band every late order
/// is, after it far-range orders are pulled forward for the next morning.
pub const YESTERDAY_ORDERS_START_TIME: u32 = 9;
pub const YESTERDAY_ORDERS_END_TIME: u32 = 14;

/// Label share at or above which an order ships as a full palette.
pub const PALETTE_LABEL_SHARE: f64 = 9.0;

/// Seni products carry this manufacturer category (TZMO).
pub const TZMO_MANUFACTURER: i64 = 6468;
pub const SENI_PRODUCTS_IDENTIFIER: &str = "Seni";

pub const PARTNERKUNDE_SALES_CHANNELS: [&str; 1] = ["Partnerkunde (netto)"];

// =========================
// Batching
// =========================
pub const MIN_BATCH_SIZE: i64 = 5;
pub const MAX_BATCH_SIZE: usize = 100;
pub const MIN_BATCH_SIZE_SENI: i64 = 3;

// =========================
// Carts
// =========================
/// Cap on open picking orders (`queue` + `taken`) before non-priority cart
/// creation stops. Priority runs are never capped.
pub const NON_PRIO_THRESHOLD: i64 = 10;
pub const PICKING_STATES: [&str; 2] = ["queue", "taken"];
pub const SWEEPING_MIN_ORDERS: usize = 1;

/// Trolley class: bounds on orders per cart plus the note label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageSize {
    S,
    M1,
    M2,
    L,
    Xl,
    Xxl,
}

impl PackageSize {
    /// Sizes handled by the cart planners; XXL (palette) is excluded, those
    /// orders are emitted as singles by the separator.
    pub const CART_SIZES: [PackageSize; 5] = [
        PackageSize::S,
        PackageSize::M1,
        PackageSize::M2,
        PackageSize::L,
        PackageSize::Xl,
    ];

    /// (min, max) orders per cart for this trolley class.
    fn bounds(self) -> (usize, usize) {
        match self {
            PackageSize::S => (1, 10),
            PackageSize::M1 => (1, 10),
            PackageSize::M2 => (1, 10),
            PackageSize::L => (1, 10),
            PackageSize::Xl => (1, 1),
            PackageSize::Xxl => (1, 1),
        }
    }

    pub fn min_orders(self) -> usize {
        self.bounds().0
    }

    pub fn max_orders(self) -> usize {
        self.bounds().1
    }

    pub fn note(self) -> &'static str {
        match self {
            PackageSize::S => NOTE_S,
            PackageSize::M1 => NOTE_M1,
            PackageSize::M2 => NOTE_M2,
            PackageSize::L => NOTE_L,
            PackageSize::Xl => NOTE_XL,
            PackageSize::Xxl => NOTE_PALETTE,
        }
    }
}

// =========================
// Special SKUs
// =========================

/// Products under the special-palette regime: orders at or above
/// `separate_batch_from` units leave the batch as individual palettes.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecialSku {
    pub id: i64,
    pub separate_batch_from: i64,
}

/// Static SKU -> special-handling map, read once per run.
#[derive(Debug, Clone, Default)]
pub struct SkusToBatch {
    by_sku: HashMap<String, SpecialSku>,
}

impl SkusToBatch {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Missing {
            what: format!("skus-to-batch file {path}: {e}"),
        })?;
        let by_sku: HashMap<String, SpecialSku> =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                what: format!("skus-to-batch file {path}: {e}"),
            })?;
        Ok(Self { by_sku })
    }

    pub fn contains_sku(&self, sku: &str) -> bool {
        self.by_sku.contains_key(sku)
    }

    pub fn contains_product(&self, product_id: i64) -> bool {
        self.by_sku.values().any(|s| s.id == product_id)
    }

    /// `separate_batch_from` for a product under the special regime.
    pub fn separation_value(&self, product_id: i64) -> Option<i64> {
        self.by_sku
            .values()
            .find(|s| s.id == product_id)
            .map(|s| s.separate_batch_from)
    }

    /// In-memory construction; tests and tools, mostly.
    pub fn from_entries(entries: &[(&str, i64, i64)]) -> Self {
        let by_sku = entries
            .iter()
            .map(|(sku, id, from)| {
                (
                    sku.to_string(),
                    SpecialSku {
                        id: *id,
                        separate_batch_from: *from,
                    },
                )
            })
            .collect();
        Self { by_sku }
    }
}

// =========================
// AppConfig
// =========================

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Production WMS base URL (trailing slash included).
    pub wms_base_url: String,

    /// Sandbox base URL, used when `PULPO_SANDBOX=1`.
    pub wms_sandbox_url: String,

    pub wms_sandbox: bool,

    /// Login for the password-grant exchange. The password itself is only
    /// ever read from `PULPO_PASSWORD`.
    pub wms_login: String,

    // =========================
    // Client throttling / retries
    // =========================
    /// Sliding-window rate limit: at most `max_calls` within `time_window`.
    ///
    /// Timestamps are recorded on successful sends only, so retries of a
    /// failed call do not double-count against the limit.
    pub max_calls: usize,
    pub time_window: Duration,

    /// Attempts per request; only rate-limit responses are retried.
    pub retries: usize,

    /// Back-off before a retry when the WMS gives no `retry_after_seconds`.
    pub retry_delay: Duration,

    pub default_page_size: usize,

    // =========================
    // External collaborators
    // =========================
    /// Blob connection string (container URL with SAS query). Absent ->
    /// degraded mode with the default roster; never fatal.
    pub roster_blob_connection: Option<String>,
    pub roster_blob_name: String,

    /// Spreadsheet holding the picker rosters, one named range per category.
    pub pickers_sheet_id: String,
    pub pickers_sheet_name: String,
    pub pickers_sheet_token: Option<String>,

    /// Article service (weclapp) base URL and token; consulted only for
    /// missing pallet capacities.
    pub article_base_url: String,
    pub article_token: Option<String>,

    /// Deep-link prefix for operator alerts about articles.
    pub article_detail_url: String,

    /// Operator alert webhook; alerts are dropped with a log when unset.
    pub alert_webhook_url: Option<String>,

    /// Path of the static SKU special-handling map.
    pub skus_to_batch_path: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let env = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());

        Self {
            wms_base_url: env("PULPO_BASE_URL")
                .unwrap_or_else(|| "https://api.pulpo.co/api/v1/".to_string()),
            wms_sandbox_url: env("PULPO_SANDBOX_URL")
                .unwrap_or_else(|| "https://api.sandbox.pulpo.co/api/v1/".to_string()),
            wms_sandbox: env("PULPO_SANDBOX").as_deref() == Some("1"),
            wms_login: env("PULPO_LOGIN").unwrap_or_else(|| "picking-bot".to_string()),

            max_calls: 180,
            time_window: Duration::from_secs(60),
            retries: 3,
            retry_delay: Duration::from_secs(30),
            default_page_size: 600,

            roster_blob_connection: env("PICKERS_BLOB_CONNECTION"),
            roster_blob_name: "pickers.json".to_string(),

            pickers_sheet_id: env("PICKERS_SHEET_ID").unwrap_or_default(),
            pickers_sheet_name: env("PICKERS_SHEET_NAME").unwrap_or_default(),
            pickers_sheet_token: env("PICKERS_SHEET_TOKEN"),

            article_base_url: env("WECLAPP_BASE_URL")
                .unwrap_or_else(|| "https://altruan.weclapp.com/webapp/api/v1/".to_string()),
            article_token: env("WECLAPP_TOKEN"),
            article_detail_url: "https://altruan.weclapp.com/webapp/view/products/articles/ArticleDetail.page?entityId=".to_string(),

            alert_webhook_url: env("ALERT_WEBHOOK_URL"),

            skus_to_batch_path: env("SKUS_TO_BATCH_PATH")
                .unwrap_or_else(|| "skus_to_batch.json".to_string()),
        }
    }

    pub fn wms_url(&self) -> &str {
        if self.wms_sandbox {
            &self.wms_sandbox_url
        } else {
            &self.wms_base_url
        }
    }
}
