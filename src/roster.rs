//! Picker rosters.
//!
//! The roster lives as one JSON blob (container URL with SAS query, read
//! from the environment). During the refresh window it is rebuilt from a
//! spreadsheet of usernames — one named range per picker category — with
//! each username resolved to a WMS user id, then re-uploaded. This process
//! is the blob's only writer.
//!
//! A missing connection string or any read failure degrades to the default
//! (empty) roster: picks land unassigned, the run never dies over this.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::ConfigError;
use crate::wms::WmsApi;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http status {status}")]
    Http { status: u16 },

    #[error("undecodable roster payload: {0}")]
    Decode(String),

    #[error("spreadsheet source not configured")]
    Unconfigured,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Roster {
    #[serde(rename = "Palettenversand", default)]
    pub palettenversand: Vec<i64>,

    #[serde(rename = "Partnerkunden", default)]
    pub partnerkunden: Vec<i64>,
}

/// Spreadsheet ranges holding the usernames per category.
const SHEET_RANGES: [(&str, &str); 2] = [("Palettenversand", "B2:B"), ("Partnerkunden", "C2:C")];

// =========================
// Blob store
// =========================

pub struct BlobStore {
    http: reqwest::Client,
    blob_url: String,
}

impl BlobStore {
    /// `connection` is the container URL carrying a SAS query
    /// (`https://{account}.blob.core.windows.net/{container}?sv=...`).
    pub fn from_connection_string(
        connection: &str,
        blob_name: &str,
    ) -> Result<Self, ConfigError> {
        let (container_url, sas) =
            connection
                .split_once('?')
                .ok_or_else(|| ConfigError::Invalid {
                    what: "blob connection string carries no SAS query".to_string(),
                })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ConfigError::Invalid {
                what: format!("blob http client: {e}"),
            })?;
        Ok(Self {
            http,
            blob_url: format!("{}/{blob_name}?{sas}", container_url.trim_end_matches('/')),
        })
    }

    pub async fn download(&self) -> Result<Roster, RosterError> {
        let resp = self.http.get(&self.blob_url).send().await?;
        if !resp.status().is_success() {
            return Err(RosterError::Http {
                status: resp.status().as_u16(),
            });
        }
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| RosterError::Decode(e.to_string()))
    }

    pub async fn upload(&self, roster: &Roster) -> Result<(), RosterError> {
        let body =
            serde_json::to_string(roster).map_err(|e| RosterError::Decode(e.to_string()))?;
        let resp = self
            .http
            .put(&self.blob_url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RosterError::Http {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Loads the roster for the run; any failure degrades to the default.
pub async fn load_roster(blob: Option<&BlobStore>) -> Roster {
    let Some(blob) = blob else {
        warn!("blob store not configured; using default roster");
        return Roster::default();
    };
    match blob.download().await {
        Ok(roster) => {
            info!(
                palettenversand = roster.palettenversand.len(),
                partnerkunden = roster.partnerkunden.len(),
                "picker roster loaded"
            );
            roster
        }
        Err(e) => {
            error!(error = %e, "roster download failed; using default roster");
            Roster::default()
        }
    }
}

// =========================
// Spreadsheet source
// =========================

pub struct SheetSource {
    http: reqwest::Client,
    sheet_id: String,
    sheet_name: String,
    token: Option<String>,
}

impl SheetSource {
    pub fn new(sheet_id: String, sheet_name: String, token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            sheet_id,
            sheet_name,
            token,
        }
    }

    /// Usernames per picker category, straight from the named ranges.
    pub async fn fetch_usernames(&self) -> Result<Vec<(&'static str, Vec<String>)>, RosterError> {
        let token = self.token.as_deref().ok_or(RosterError::Unconfigured)?;
        if self.sheet_id.is_empty() {
            return Err(RosterError::Unconfigured);
        }

        let mut out = Vec::new();
        for (category, range) in SHEET_RANGES {
            let url = format!(
                "https://sheets.googleapis.com/v4/spreadsheets/{}/values/'{}'!{}",
                self.sheet_id, self.sheet_name, range
            );
            let resp = self
                .http
                .get(&url)
                .header("authorization", format!("Bearer {token}"))
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(RosterError::Http {
                    status: resp.status().as_u16(),
                });
            }
            let payload: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| RosterError::Decode(e.to_string()))?;
            let usernames = payload
                .get("values")
                .and_then(serde_json::Value::as_array)
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| row.get(0))
                        .filter_map(serde_json::Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            out.push((category, usernames));
        }
        Ok(out)
    }
}

/// Rebuilds the roster from the spreadsheet, resolving each username to a
/// WMS user id. Unknown usernames are logged and dropped.
pub async fn refresh_roster(
    sheet: &SheetSource,
    api: &dyn WmsApi,
) -> Result<Roster, RosterError> {
    let mut roster = Roster::default();
    for (category, usernames) in sheet.fetch_usernames().await? {
        for username in usernames {
            match api.find_user(&username).await {
                Ok(Some(user)) => {
                    let bucket = match category {
                        "Palettenversand" => &mut roster.palettenversand,
                        _ => &mut roster.partnerkunden,
                    };
                    bucket.push(user.id);
                }
                Ok(None) => warn!(username, category, "no WMS user for roster entry"),
                Err(e) => error!(username, error = %e, "user lookup failed"),
            }
        }
    }
    Ok(roster)
}
