//! Endpoint surface the flows consume.
//!
//! Planners and the orchestrator talk to this trait, not to raw HTTP; the
//! HTTP implementation lives on `WmsClient`, tests provide an in-memory
//! mock. Records that fail to decode inside a paginated scan are logged
//! and skipped so one malformed row never aborts a run.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::config;
use crate::wms::client::WmsClient;
use crate::wms::errors::WmsError;
use crate::wms::types::{
    FulfillmentOrder, NewPickingOrder, PickingOrderRecord, Product, ProductUpdate, StockRecord,
    User,
};

#[async_trait]
pub trait WmsApi: Send + Sync {
    /// All fulfillment orders currently in the `queue` state.
    async fn queued_fulfillments(&self) -> Result<Vec<FulfillmentOrder>, WmsError>;

    /// Full stock scan (every zone; callers filter to picking zones).
    async fn stock_records(&self) -> Result<Vec<StockRecord>, WmsError>;

    async fn product(&self, product_id: i64) -> Result<Product, WmsError>;

    async fn update_product(&self, product_id: i64, update: &ProductUpdate)
    -> Result<(), WmsError>;

    async fn create_picking(&self, new_pick: &NewPickingOrder) -> Result<(), WmsError>;

    async fn delete_picking(&self, picking_order_id: i64) -> Result<(), WmsError>;

    /// Picking orders in `state`, optionally restricted to one owner.
    async fn picking_orders(
        &self,
        state: &str,
        owner_id: Option<i64>,
    ) -> Result<Vec<PickingOrderRecord>, WmsError>;

    async fn pause_sales_order(&self, sales_order_id: i64) -> Result<(), WmsError>;

    async fn find_user(&self, username: &str) -> Result<Option<User>, WmsError>;
}

fn decode_record<T: DeserializeOwned>(endpoint: &str, record: Value) -> Option<T> {
    match serde_json::from_value(record) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(endpoint, error = %e, "skipping undecodable record");
            None
        }
    }
}

impl WmsClient {
    async fn collect_records<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Vec<(String, String)>,
        page_size: usize,
    ) -> Result<Vec<T>, WmsError> {
        let mut pager = self.paginate(endpoint, params, page_size);
        let mut out = Vec::new();
        while let Some(record) = pager.next().await? {
            if let Some(decoded) = decode_record(endpoint, record) {
                out.push(decoded);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl WmsApi for WmsClient {
    async fn queued_fulfillments(&self) -> Result<Vec<FulfillmentOrder>, WmsError> {
        self.collect_records(
            "sales/orders/fulfillments",
            vec![("state".to_string(), config::QUEUE_STATE.to_string())],
            self.default_page_size,
        )
        .await
    }

    async fn stock_records(&self) -> Result<Vec<StockRecord>, WmsError> {
        self.collect_records(
            "inventory/stocks",
            Vec::new(),
            config::SHELVES_INDEX_PAGE_LENGTH,
        )
        .await
    }

    async fn product(&self, product_id: i64) -> Result<Product, WmsError> {
        let endpoint = format!("inventory/products/{product_id}");
        let value = self.request(Method::GET, &endpoint, &[], None).await?;
        serde_json::from_value(value).map_err(|e| WmsError::Decode(e.to_string()))
    }

    async fn update_product(
        &self,
        product_id: i64,
        update: &ProductUpdate,
    ) -> Result<(), WmsError> {
        let endpoint = format!("inventory/products/{product_id}");
        let body = serde_json::to_value(update).map_err(|e| WmsError::Decode(e.to_string()))?;
        self.request(Method::PUT, &endpoint, &[], Some(&body))
            .await?;
        Ok(())
    }

    async fn create_picking(&self, new_pick: &NewPickingOrder) -> Result<(), WmsError> {
        let body = serde_json::to_value(new_pick).map_err(|e| WmsError::Decode(e.to_string()))?;
        self.request(Method::POST, "picking/orders", &[], Some(&body))
            .await?;
        Ok(())
    }

    async fn delete_picking(&self, picking_order_id: i64) -> Result<(), WmsError> {
        let endpoint = format!("picking/orders/{picking_order_id}");
        self.request(Method::DELETE, &endpoint, &[], None).await?;
        Ok(())
    }

    async fn picking_orders(
        &self,
        state: &str,
        owner_id: Option<i64>,
    ) -> Result<Vec<PickingOrderRecord>, WmsError> {
        let mut params = vec![("state".to_string(), state.to_string())];
        if let Some(owner) = owner_id {
            params.push(("owner_id".to_string(), owner.to_string()));
        }
        self.collect_records("picking/orders", params, self.default_page_size)
            .await
    }

    async fn pause_sales_order(&self, sales_order_id: i64) -> Result<(), WmsError> {
        let endpoint = format!("sales/orders/{sales_order_id}/pause");
        self.request(Method::POST, &endpoint, &[], None).await?;
        Ok(())
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, WmsError> {
        let params = vec![("username".to_string(), username.to_string())];
        let value = self.request(Method::GET, "iam/users", &params, None).await?;
        let Value::Array(users) = value else {
            return Err(WmsError::NotAList {
                endpoint: "iam/users".to_string(),
            });
        };
        Ok(users
            .into_iter()
            .next()
            .and_then(|u| decode_record("iam/users", u)))
    }
}
