//! Operator alerts.
//!
//! One incoming-webhook channel; the only automated alert is a product
//! that no source can supply a pallet capacity for. Alert failures are
//! logged and never propagate — losing an alert must not cost a run.

use std::time::Duration;

use tracing::{error, warn};

use crate::wms::types::Product;

pub struct Alerts {
    http: reqwest::Client,
    webhook_url: Option<String>,
    article_detail_url: String,
}

impl Alerts {
    pub fn new(webhook_url: Option<String>, article_detail_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            webhook_url,
            article_detail_url,
        }
    }

    /// Tells the operators an external collaborator is unavailable and the
    /// run carried on without it.
    pub async fn service_unavailable(&self, text: &str) {
        self.post(text).await;
    }

    /// Tells the operators a product has no pallet information anywhere;
    /// batching treats it as unbounded until somebody fills it in.
    pub async fn pallet_info_missing(&self, product: &Product) {
        let mut text = format!(
            "Produkt \"{}\" hat keine Paletteninformation; Batches werden ohne Limit gebildet.",
            product.display_name()
        );
        if let Some(article_id) = product.attributes.weclapp_article_id.as_deref() {
            text.push_str(&format!(" {}{}", self.article_detail_url, article_id));
        }
        self.post(&text).await;
    }

    async fn post(&self, text: &str) {
        let Some(url) = self.webhook_url.as_deref() else {
            warn!(text, "alert webhook not configured, dropping alert");
            return;
        };
        let body = serde_json::json!({ "text": text });
        match self.http.post(url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => error!(status = resp.status().as_u16(), "alert delivery failed"),
            Err(e) => error!(error = %e, "alert delivery failed"),
        }
    }
}
