//! Fishing Frenzy REST client.
//!
//! Base URL: https://api.fishingfrenzy.co (configurable)
//! Auth: `Authorization: Bearer {token}` on every request.
//!
//! The service expects browser-like `Origin`/`Referer` headers; they are
//! installed once as client defaults together with the credential.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, ORIGIN, REFERER};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{DailyClaimResult, DailyRewardStatus, GameApi, InventoryStatus};
use crate::types::AnglerError;

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

const INVENTORY: &str = "/v1/inventory";
const DAILY_STATUS: &str = "/v1/daily-rewards/status";
const DAILY_CLAIM: &str = "/v1/daily-rewards/claim";
const SELL_FISH: &str = "/v1/inventory/sell-fish";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SellFishRequest<'a> {
    fish_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    #[serde(default)]
    success: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated client for one account.
pub struct FrenzyClient {
    http: Client,
    base_url: String,
}

impl FrenzyClient {
    pub fn new(
        base_url: &str,
        origin: &str,
        token: &SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .context("Token contains characters not allowed in a header")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        if !origin.is_empty() {
            let origin_value =
                HeaderValue::from_str(origin).context("Invalid origin header value")?;
            let referer = HeaderValue::from_str(&format!("{}/", origin.trim_end_matches('/')))
                .context("Invalid referer header value")?;
            headers.insert(ORIGIN, origin_value);
            headers.insert(REFERER, referer);
        }

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent("ANGLER/0.1.0")
            .build()
            .context("Failed to build HTTP client for the game API")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map non-2xx responses to `AnglerError::Api` and decode the rest.
    async fn decode<T: DeserializeOwned>(endpoint: &str, resp: Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnglerError::Api {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }
        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to parse {endpoint} response"))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        debug!(endpoint, "GET");
        let resp = self
            .http
            .get(self.url(endpoint))
            .send()
            .await
            .with_context(|| format!("Request to {endpoint} failed"))?;
        Self::decode(endpoint, resp).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        debug!(endpoint, "POST");
        let resp = self
            .http
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Request to {endpoint} failed"))?;
        Self::decode(endpoint, resp).await
    }
}

#[async_trait]
impl GameApi for FrenzyClient {
    async fn inventory(&self) -> Result<InventoryStatus> {
        self.get(INVENTORY).await
    }

    async fn daily_reward_status(&self) -> Result<DailyRewardStatus> {
        self.get(DAILY_STATUS).await
    }

    async fn claim_daily_reward(&self) -> Result<DailyClaimResult> {
        self.post(DAILY_CLAIM, &serde_json::json!({})).await
    }

    async fn sell_fish(&self, fish_ids: &[String]) -> Result<bool> {
        let resp: SuccessResponse = self.post(SELL_FISH, &SellFishRequest { fish_ids }).await?;
        Ok(resp.success)
    }
}
