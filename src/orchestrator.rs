//! Run orchestration.
//!
//! One invocation, one cooperative task: maintenance hooks, Altruan
//! preprocessing, stock topology, separation, then the planners in fixed
//! order — priority band before non-priority, batches before Seni carts
//! before the remaining carts, every cart size except the palette class.
//!
//! Only failing to obtain a bearer token kills a run. Everything else is
//! logged at this boundary and the run presses on to the next step, closes
//! the session exactly once and reports `{"status":"finished"}`.

use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{Instrument, error, info, warn};

use crate::alerts::Alerts;
use crate::article::ArticleClient;
use crate::batching::BatchPlanner;
use crate::carts::CartsManager;
use crate::clock::Clock;
use crate::config::{self, AppConfig, PackageSize, SkusToBatch};
use crate::context::RunContext;
use crate::logger::{RunId, run_span, warn_if_slow};
use crate::metrics::Counters;
use crate::ops::PickOps;
use crate::roster::{BlobStore, Roster, SheetSource, load_roster, refresh_roster};
use crate::separator::Separator;
use crate::shelves::build_topology;
use crate::wms::{WmsApi, WmsClient};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: &'static str,
}

impl RunSummary {
    fn finished() -> Self {
        Self { status: "finished" }
    }
}

pub struct Orchestrator {
    cfg: AppConfig,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(cfg: AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self { cfg, clock }
    }

    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        let run_id = RunId::new();
        let span = run_span(&run_id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> anyhow::Result<RunSummary> {
        let now = self.clock.now();
        let is_sweeping_time = config::SWEEPING_HOURS.contains(&now.hour());
        warn!(hour = now.hour(), is_sweeping_time, "run starting");

        // No bearer token, no run. Everything after this degrades instead.
        let client = WmsClient::connect(&self.cfg)
            .await
            .context("wms authentication failed")?;

        let counters = Counters::default();
        let ops = PickOps::new(&client, counters.clone());

        let alerts = Alerts::new(
            self.cfg.alert_webhook_url.clone(),
            self.cfg.article_detail_url.clone(),
        );

        let blob = self.blob_store();
        let roster = load_roster(blob.as_ref()).await;

        self.maintenance(&ops, &alerts, &now, blob.as_ref()).await;

        let skus_to_batch = SkusToBatch::load(&self.cfg.skus_to_batch_path).unwrap_or_else(|e| {
            error!(error = %e, "special-SKU map unusable, continuing without");
            SkusToBatch::default()
        });

        let article = ArticleClient::new(
            self.cfg.article_base_url.clone(),
            self.cfg.article_token.clone(),
        )
        .context("article client")?;

        if let Err(e) = run_flows(
            &ops,
            &article,
            &alerts,
            &skus_to_batch,
            &roster,
            now,
            is_sweeping_time,
        )
        .await
        {
            error!(error = ?e, "run aborted mid-flow");
        }

        let load = |c: &std::sync::Arc<std::sync::atomic::AtomicU64>| {
            c.load(std::sync::atomic::Ordering::Relaxed)
        };
        info!(
            picks = load(&counters.picks_created),
            singles = load(&counters.singles_created),
            batches = load(&counters.batches_created),
            carts = load(&counters.carts_created),
            picks_failed = load(&counters.picks_failed),
            orders_unavailable = load(&counters.orders_unavailable),
            "run finished"
        );

        client.close();
        Ok(RunSummary::finished())
    }

    fn blob_store(&self) -> Option<BlobStore> {
        let Some(connection) = self.cfg.roster_blob_connection.as_deref() else {
            error!("PICKERS_BLOB_CONNECTION not set; degraded roster mode");
            return None;
        };
        match BlobStore::from_connection_string(connection, &self.cfg.roster_blob_name) {
            Ok(blob) => Some(blob),
            Err(e) => {
                error!(error = %e, "blob store misconfigured; degraded roster mode");
                None
            }
        }
    }

    /// Night hours delete unowned queued picks; daytime hours refresh the
    /// picker roster from the spreadsheet.
    async fn maintenance(
        &self,
        ops: &PickOps<'_>,
        alerts: &Alerts,
        now: &DateTime<Tz>,
        blob: Option<&BlobStore>,
    ) {
        if config::NIGHT_CLEANING_HOURS.contains(&now.hour()) {
            ops.cleaner().await;
        }
        if config::PICKERS_UPDATE_HOURS.contains(&now.hour()) {
            self.update_pickers(ops, alerts, blob).await;
        }
    }

    async fn update_pickers(&self, ops: &PickOps<'_>, alerts: &Alerts, blob: Option<&BlobStore>) {
        let sheet = SheetSource::new(
            self.cfg.pickers_sheet_id.clone(),
            self.cfg.pickers_sheet_name.clone(),
            self.cfg.pickers_sheet_token.clone(),
        );
        let roster = match refresh_roster(&sheet, ops.api).await {
            Ok(roster) => roster,
            Err(e) => {
                error!(error = %e, "roster refresh failed, keeping blob version");
                alerts
                    .service_unavailable(&format!(
                        "Pickerliste konnte nicht aus dem Sheet aktualisiert werden ({e}); \
                         die gespeicherte Liste bleibt in Verwendung."
                    ))
                    .await;
                return;
            }
        };
        let Some(blob) = blob else {
            warn!("no blob store; refreshed roster not persisted");
            return;
        };
        match blob.upload(&roster).await {
            Ok(()) => info!("picker roster refreshed"),
            Err(e) => error!(error = %e, "roster upload failed"),
        }
    }
}

/// Steps 3–6 of a run, factored out so integration tests can drive them
/// against an in-memory API with a pinned clock.
pub async fn run_flows(
    ops: &PickOps<'_>,
    article: &ArticleClient,
    alerts: &Alerts,
    skus_to_batch: &SkusToBatch,
    roster: &Roster,
    now: DateTime<Tz>,
    is_sweeping_time: bool,
) -> anyhow::Result<()> {
    pause_altruan_orders(ops).await;

    let topology = warn_if_slow(
        "build_topology",
        std::time::Duration::from_secs(60),
        build_topology(ops.api),
    )
    .await
    .context("building stock topology")?;
    let mut ctx = RunContext::new(topology);

    let mut separator = Separator::new(ops, now, is_sweeping_time, skus_to_batch, roster).await;
    let separation = separator.run(&mut ctx).await.context("separating orders")?;
    let is_running_dry = separation.is_running_dry();
    warn!(is_running_dry, orders = separation.orders_count, "running-dry check");

    let mut carts = CartsManager::new(ops, now, is_sweeping_time, is_running_dry);

    for (is_prio, buckets) in [(true, &separation.prio), (false, &separation.non_prio)] {
        warn!(is_prio, "processing priority band");

        let batch_planner = BatchPlanner {
            ops,
            article,
            alerts,
            skus_to_batch,
            now,
            is_prio,
            is_running_dry,
        };
        batch_planner.run(&buckets.for_batches, &mut ctx).await;

        for cart_list in [&buckets.seni_carts, &buckets.other_carts] {
            warn!(orders = cart_list.len(), "processing cart cohort");
            for size in PackageSize::CART_SIZES {
                if carts.no_space_left && !is_sweeping_time {
                    warn!("no space left in the warehouse, skipping cart creation");
                    break;
                }
                carts.run_size(size, cart_list, is_prio, &mut ctx).await;
            }
        }
    }

    Ok(())
}

/// Orders shipping with the Altruan Lieferdienst are paused and excluded
/// from the run; the paused fulfillment drops out of the queue scan.
async fn pause_altruan_orders(ops: &PickOps<'_>) {
    let orders = match ops.api.queued_fulfillments().await {
        Ok(orders) => orders,
        Err(e) => {
            error!(error = %e, "preprocessing scan failed");
            return;
        }
    };
    for order in orders {
        if order.shipping_method_id == Some(config::ALTRUAN_LIEFERDIENST) {
            ops.pause_order(order.sales_order_id).await;
        }
    }
}
