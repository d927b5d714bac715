//! Authenticated, throttled request layer against the WMS.
//!
//! One `WmsClient` is created per run, owned by the orchestrator and passed
//! by reference to every component; only the orchestrator closes it. All
//! calls go through `request`, which applies the sliding-window rate
//! limiter and the retry policy before any payload interpretation happens.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::wms::errors::WmsError;
use crate::wms::paginate::Paginator;

pub struct WmsClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    /// Send timestamps inside the current window; successful sends only.
    call_stamps: Mutex<VecDeque<Instant>>,
    max_calls: usize,
    time_window: Duration,
    retries: usize,
    retry_delay: Duration,
    pub(crate) default_page_size: usize,
}

impl WmsClient {
    /// Builds the HTTP client and performs the password-grant exchange.
    /// The password is read from `PULPO_PASSWORD`; failing to obtain a
    /// bearer token is the only startup-fatal condition of a run.
    pub async fn connect(cfg: &AppConfig) -> Result<Self, WmsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        let password = std::env::var("PULPO_PASSWORD")
            .map_err(|_| WmsError::Auth("PULPO_PASSWORD is not set".to_string()))?;

        let url = format!("{}auth", cfg.wms_url());
        let body = serde_json::json!({
            "grant_type": "password",
            "password": password,
            "scope": "default",
            "username": cfg.wms_login,
        });

        let resp = http.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WmsError::Auth(format!("auth returned {}", status.as_u16())));
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| WmsError::Decode(e.to_string()))?;

        let token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| WmsError::Auth(format!("no access_token in {payload}")))?
            .to_string();

        debug!("wms token acquired");

        let client = Self {
            http,
            base_url: cfg.wms_url().to_string(),
            token,
            call_stamps: Mutex::new(VecDeque::new()),
            max_calls: cfg.max_calls,
            time_window: cfg.time_window,
            retries: cfg.retries,
            retry_delay: cfg.retry_delay,
            default_page_size: cfg.default_page_size,
        };
        client.record_call();
        Ok(client)
    }

    /// Single request with throttling, retries and response shaping.
    ///
    /// Query parameters are sent for GET only, the body for POST/PUT only.
    /// Retried: WMS rate-limit responses (waiting `retry_after_seconds`
    /// when given) and HTTP 429. Everything else surfaces immediately.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, WmsError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.throttle().await;

            let mut req = self
                .http
                .request(method.clone(), &url)
                .header("authorization", format!("bearer {}", self.token))
                .header("content-type", "application/json");
            if method == Method::GET {
                req = req.query(params);
            }
            if method == Method::POST || method == Method::PUT {
                req = req.json(body.unwrap_or(&Value::Object(Default::default())));
            }

            let resp = req.send().await?;
            let status = resp.status();
            if !status.is_success() {
                if status.as_u16() == 429 && attempt < self.retries {
                    warn!(
                        endpoint,
                        attempt,
                        retries = self.retries,
                        delay_s = self.retry_delay.as_secs(),
                        "http 429, backing off"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
                return Err(WmsError::Http {
                    status: status.as_u16(),
                });
            }

            let payload: Value = resp
                .json()
                .await
                .map_err(|e| WmsError::Decode(e.to_string()))?;

            self.record_call();

            match shape_response(payload) {
                Ok(value) => return Ok(value),
                Err(err @ WmsError::RateLimited { retry_after }) => {
                    if attempt < self.retries {
                        let delay = retry_after
                            .map(Duration::from_secs)
                            .unwrap_or(self.retry_delay);
                        warn!(
                            endpoint,
                            attempt,
                            retries = self.retries,
                            delay_s = delay.as_secs(),
                            "api rate limit reached, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
                Err(err) => {
                    warn!(endpoint, error = %err, "business error response");
                    return Err(err);
                }
            }
        }
    }

    /// Lazy record iterator over a list endpoint.
    pub fn paginate(
        &self,
        endpoint: &str,
        params: Vec<(String, String)>,
        page_size: usize,
    ) -> Paginator<'_> {
        Paginator::new(self, endpoint.to_string(), params, page_size, None)
    }

    /// Like `paginate`, but stops after roughly `stop_after_n_items`
    /// records (iteration ends with the page that crosses the cap).
    pub fn paginate_capped(
        &self,
        endpoint: &str,
        params: Vec<(String, String)>,
        page_size: usize,
        stop_after_n_items: usize,
    ) -> Paginator<'_> {
        Paginator::new(
            self,
            endpoint.to_string(),
            params,
            page_size,
            Some(stop_after_n_items),
        )
    }

    /// Sleeps until the oldest recorded call leaves the window whenever the
    /// cap is reached. Runs before every send; the lock is never held
    /// across a suspension point.
    async fn throttle(&self) {
        loop {
            let wait = {
                let mut stamps = self.call_stamps.lock();
                let now = Instant::now();
                while stamps
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.time_window)
                {
                    stamps.pop_front();
                }
                if stamps.len() >= self.max_calls {
                    stamps
                        .front()
                        .map(|oldest| self.time_window - now.duration_since(*oldest))
                } else {
                    None
                }
            };

            match wait {
                Some(d) if d > Duration::ZERO => {
                    warn!(wait_ms = d.as_millis() as u64, "api rate limit reached, waiting");
                    tokio::time::sleep(d).await;
                }
                _ => break,
            }
        }
    }

    fn record_call(&self) {
        self.call_stamps.lock().push_back(Instant::now());
    }

    /// Closes the session. The orchestrator calls this exactly once.
    pub fn close(self) {
        debug!("wms session closed");
    }
}

/// Interprets a decoded WMS payload.
///
/// - `{total_results, <key>: [...]}` -> the list under the other key;
/// - a mapping with `created` -> the mapping verbatim;
/// - `errors`/`message` keys or a bare string -> business error, upgraded
///   to `RateLimited` when the message is `api_rate_limit_reached`;
/// - anything else passes through unchanged.
fn shape_response(payload: Value) -> Result<Value, WmsError> {
    if let Value::Object(ref map) = payload {
        if map.contains_key("total_results") {
            for (key, value) in map {
                if key.as_str() != "total_results" {
                    return Ok(value.clone());
                }
            }
        }
        if map.contains_key("created") {
            return Ok(payload);
        }
    }

    let is_error = match &payload {
        Value::Object(map) => map.contains_key("errors") || map.contains_key("message"),
        Value::String(_) => true,
        _ => false,
    };
    if is_error {
        if payload.get("message").and_then(Value::as_str) == Some("api_rate_limit_reached") {
            let retry_after = payload.get("retry_after_seconds").and_then(Value::as_u64);
            return Err(WmsError::RateLimited { retry_after });
        }
        return Err(WmsError::Business { payload });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_response_is_unwrapped() {
        let shaped = shape_response(json!({
            "total_results": 2,
            "fulfillments": [{"a": 1}, {"a": 2}],
        }))
        .unwrap();
        assert_eq!(shaped, json!([{"a": 1}, {"a": 2}]));
    }

    #[test]
    fn created_response_passes_verbatim() {
        let payload = json!({"created": true, "id": 9});
        assert_eq!(shape_response(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn plain_mapping_passes_through() {
        let payload = json!({"id": 1, "state": "queue"});
        assert_eq!(shape_response(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn message_key_is_a_business_error() {
        let err = shape_response(json!({"message": "order not in queue"})).unwrap_err();
        assert!(matches!(err, WmsError::Business { .. }));
    }

    #[test]
    fn bare_string_is_a_business_error() {
        let err = shape_response(json!("boom")).unwrap_err();
        assert!(matches!(err, WmsError::Business { .. }));
    }

    #[test]
    fn rate_limit_message_carries_retry_after() {
        let err = shape_response(json!({
            "message": "api_rate_limit_reached",
            "retry_after_seconds": 12,
        }))
        .unwrap_err();
        match err {
            WmsError::RateLimited { retry_after } => assert_eq!(retry_after, Some(12)),
            other => panic!("unexpected: {other}"),
        }
        assert!(
            shape_response(json!({"message": "api_rate_limit_reached"}))
                .unwrap_err()
                .is_rate_limit()
        );
    }
}
