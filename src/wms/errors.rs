use thiserror::Error;

#[derive(Error, Debug)]
pub enum WmsError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http status {status}")]
    Http { status: u16 },

    #[error("api rate limit reached (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("business error: {payload}")]
    Business { payload: serde_json::Value },

    #[error("endpoint {endpoint} did not return a list")]
    NotAList { endpoint: String },

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl WmsError {
    /// Only rate-limit conditions are worth a retry; everything else is
    /// surfaced to the caller immediately.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, WmsError::RateLimited { .. })
    }
}
