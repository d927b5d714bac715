//! Article-master service client (weclapp).
//!
//! Consulted for exactly one thing: deriving `units_per_pallet` when the
//! WMS product record has none. The packaging custom attributes describe
//! quantities per pack, per carton and per shipping unit plus the level the
//! article is counted at; the pallet capacity is the product of the levels
//! above that one.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::wms::types::Product;

// Tenant attribute-definition ids of the packaging block.
const ATTR_VS_INFO_EBENE: &str = "270611";
const ATTR_VS_INFO_PACK_ANZ: &str = "270612";
const ATTR_VS_INFO_KARTON_ANZ: &str = "270613";
const ATTR_VS_INFO_VERSAND_ANZ: &str = "270614";

// Selected-value ids of the `VsInfoEbene` enumeration.
const EBENE_ARTIKEL: &str = "270620";
const EBENE_PACKUNG: &str = "270621";
const EBENE_KARTON: &str = "270622";

#[derive(Error, Debug)]
pub enum ArticleError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http status {status}")]
    Http { status: u16 },

    #[error("article service token not configured")]
    Unconfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagingLevel {
    Artikel,
    Packung,
    Karton,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackagingInfo {
    pub level: PackagingLevel,
    pub per_pack: f64,
    pub per_carton: f64,
    pub per_shipping: f64,
}

impl PackagingInfo {
    /// Units per pallet under the level-multiplication rule: an article
    /// counted at `Artikel` level multiplies through all three packaging
    /// levels, coarser levels skip the ones below them.
    pub fn units_per_pallet(&self) -> i64 {
        let units = match self.level {
            PackagingLevel::Artikel => self.per_pack * self.per_carton * self.per_shipping,
            PackagingLevel::Packung => self.per_carton * self.per_shipping,
            PackagingLevel::Karton => self.per_shipping,
        };
        units as i64
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    pub id: Option<String>,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAttribute {
    pub attribute_definition_id: Option<String>,
    pub string_value: Option<String>,
    pub selected_value_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    result: Vec<ArticleRecord>,
}

pub struct ArticleClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ArticleClient {
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, ArticleError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Derives the pallet capacity for a WMS product: lookup by the stored
    /// article id, by SKU otherwise, then the level-multiplication rule.
    /// `Ok(None)` means the article exists but carries no usable packaging
    /// info.
    pub async fn units_per_pallet(&self, product: &Product) -> Result<Option<i64>, ArticleError> {
        let article = match product.attributes.weclapp_article_id.as_deref() {
            Some(article_id) => self.article_by_id(article_id).await?,
            None => match product.sku.as_deref() {
                Some(sku) => self.article_by_sku(sku).await?,
                None => None,
            },
        };
        let units = article
            .as_ref()
            .and_then(packaging_info)
            .map(|p| p.units_per_pallet());
        debug!(product = product.display_name(), ?units, "article lookup");
        Ok(units)
    }

    async fn article_by_id(&self, article_id: &str) -> Result<Option<ArticleRecord>, ArticleError> {
        let url = format!("{}article/id/{article_id}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("AuthenticationToken", self.token()?)
            .send()
            .await?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ArticleError::Http {
                status: resp.status().as_u16(),
            });
        }
        Ok(Some(resp.json().await?))
    }

    async fn article_by_sku(&self, sku: &str) -> Result<Option<ArticleRecord>, ArticleError> {
        let url = format!("{}article", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("AuthenticationToken", self.token()?)
            .query(&[
                ("sku", sku),
                ("active", "true"),
                ("articleType", "STORABLE"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ArticleError::Http {
                status: resp.status().as_u16(),
            });
        }
        let result: QueryResult = resp.json().await?;
        Ok(result.result.into_iter().next())
    }

    fn token(&self) -> Result<&str, ArticleError> {
        self.token.as_deref().ok_or(ArticleError::Unconfigured)
    }
}

/// Reads the packaging block off an article. All three quantities and a
/// packaging level other than `Keine` must be present.
pub fn packaging_info(article: &ArticleRecord) -> Option<PackagingInfo> {
    let attr = |definition_id: &str| {
        article
            .custom_attributes
            .iter()
            .find(|a| a.attribute_definition_id.as_deref() == Some(definition_id))
    };

    let level = match attr(ATTR_VS_INFO_EBENE)?.selected_value_id.as_deref()? {
        EBENE_ARTIKEL => PackagingLevel::Artikel,
        EBENE_PACKUNG => PackagingLevel::Packung,
        EBENE_KARTON => PackagingLevel::Karton,
        _ => return None,
    };

    let number = |definition_id: &str| -> Option<f64> {
        attr(definition_id)?.string_value.as_deref()?.parse().ok()
    };

    Some(PackagingInfo {
        level,
        per_pack: number(ATTR_VS_INFO_PACK_ANZ)?,
        per_carton: number(ATTR_VS_INFO_KARTON_ANZ)?,
        per_shipping: number(ATTR_VS_INFO_VERSAND_ANZ)?,
    })
}
