//! Product Advertising API 5.0 price source.
//!
//! Calls `GetItems` for one ASIN per alert, signed with AWS Signature V4.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use solefeed_core::{PriceAlert, PriceSourceKind};

use super::catalog::extract_asin;
use super::{PriceSource, PriceSourceError};
use crate::config::PaapiConfig;
use crate::crypto::{sigv4_authorization, SigV4Scope};

const GET_ITEMS_PATH: &str = "/paapi5/getitems";
const GET_ITEMS_TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.GetItems";
const SERVICE_NAME: &str = "ProductAdvertisingAPI";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const CONTENT_ENCODING: &str = "amz-1.0";

/// Error codes meaning "no such item" rather than a failed call.
const NOT_FOUND_CODES: [&str; 2] = ["ItemNotAccessible", "InvalidParameterValue"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetItemsRequest<'a> {
    item_ids: [&'a str; 1],
    resources: [&'static str; 2],
    partner_tag: &'a str,
    partner_type: &'static str,
    marketplace: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetItemsResponse {
    #[serde(default)]
    items_result: Option<ItemsResult>,
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResult {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Item {
    #[serde(rename = "ASIN")]
    asin: String,
    #[serde(default)]
    offers: Option<Offers>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Offers {
    #[serde(default)]
    listings: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Listing {
    #[serde(default)]
    price: Option<Price>,
    #[serde(default)]
    availability: Option<Availability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Price {
    amount: f64,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Availability {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiErrorEntry {
    code: String,
    #[serde(default)]
    message: String,
}

/// Prices from the Product Advertising API.
#[derive(Debug, Clone)]
pub struct LivePriceSource {
    client: Client,
    endpoint: String,
    config: PaapiConfig,
}

impl LivePriceSource {
    /// Create a source for `https://{config.host}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: PaapiConfig, timeout: Duration) -> Result<Self, PriceSourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("https://{}", config.host),
            config,
        })
    }

    /// Send requests to `endpoint` instead of the configured host.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_item_price(&self, asin: &str) -> Result<Option<i64>, PriceSourceError> {
        let body = serde_json::to_vec(&GetItemsRequest {
            item_ids: [asin],
            resources: ["Offers.Listings.Price", "Offers.Listings.Availability.Message"],
            partner_tag: &self.config.partner_tag,
            partner_type: "Associates",
            marketplace: "www.amazon.com",
        })
        .map_err(|e| PriceSourceError::InvalidResponse(e.to_string()))?;

        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let authorization = sigv4_authorization(
            &SigV4Scope {
                access_key: &self.config.access_key,
                secret_key: &self.config.secret_key,
                region: &self.config.region,
                service: SERVICE_NAME,
            },
            "POST",
            GET_ITEMS_PATH,
            &[
                ("content-encoding", CONTENT_ENCODING),
                ("content-type", CONTENT_TYPE),
                ("host", self.config.host.as_str()),
                ("x-amz-date", amz_date.as_str()),
                ("x-amz-target", GET_ITEMS_TARGET),
            ],
            &body,
            &amz_date,
        );

        let response = self
            .client
            .post(format!("{}{GET_ITEMS_PATH}", self.endpoint))
            .header("content-encoding", CONTENT_ENCODING)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-date", &amz_date)
            .header("x-amz-target", GET_ITEMS_TARGET)
            .header("authorization", authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        let parsed: GetItemsResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(PriceSourceError::Api {
                    status: status.as_u16(),
                    message: text.chars().take(200).collect(),
                })
            }
            Err(e) => return Err(PriceSourceError::InvalidResponse(e.to_string())),
        };

        if let Some(error) = parsed.errors.first() {
            if NOT_FOUND_CODES.contains(&error.code.as_str()) {
                tracing::debug!(asin = %asin, code = %error.code, "Product not found");
                return Ok(None);
            }
            if !status.is_success() || parsed.items_result.is_none() {
                return Err(PriceSourceError::Api {
                    status: status.as_u16(),
                    message: format!("{}: {}", error.code, error.message),
                });
            }
        }

        if !status.is_success() {
            return Err(PriceSourceError::Api {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        let listing = parsed
            .items_result
            .into_iter()
            .flat_map(|r| r.items)
            .find(|item| item.asin.eq_ignore_ascii_case(asin))
            .and_then(|item| item.offers)
            .and_then(|offers| offers.listings.into_iter().find(|l| l.price.is_some()));

        let Some(listing) = listing else {
            return Ok(None);
        };
        let Some(price) = listing.price else {
            return Ok(None);
        };

        tracing::debug!(
            asin = %asin,
            amount = price.amount,
            currency = ?price.currency,
            availability = ?listing.availability.and_then(|a| a.message),
            "Live price fetched"
        );

        amount_to_cents(price.amount).map(Some)
    }
}

/// Convert a decimal amount to integer cents, rounding to the nearest cent.
fn amount_to_cents(amount: f64) -> Result<i64, PriceSourceError> {
    if !amount.is_finite() || amount <= 0.0 || amount > 1e12 {
        return Err(PriceSourceError::InvalidResponse(format!(
            "unusable price amount {amount}"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok((amount * 100.0).round() as i64)
}

#[async_trait]
impl PriceSource for LivePriceSource {
    fn kind(&self) -> PriceSourceKind {
        PriceSourceKind::Live
    }

    async fn quote(&self, alert: &PriceAlert) -> Result<Option<i64>, PriceSourceError> {
        let asin = extract_asin(&alert.product_id, alert.product.purchase_url.as_deref())
            .ok_or_else(|| PriceSourceError::MissingIdentifier(alert.product_id.clone()))?;
        self.get_item_price(&asin).await
    }
}
