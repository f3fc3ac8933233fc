use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::RPC_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::types::{PollKey, RawMarketState, VolumePage};

/// Read-only view of the ledger contracts the engine depends on.
#[async_trait]
pub trait MarketReader: Send + Sync {
    /// Returns `2 * keys.len()` slots: `[2i]` is the AMM market of `keys[i]`,
    /// `[2i + 1]` its Pari-Mutuel market.
    async fn get_markets_state(&self, keys: &[PollKey]) -> Result<Vec<RawMarketState>>;

    /// One page of per-period volume records for a market.
    async fn get_paginated_volume(
        &self,
        market_address: &str,
        offset: u64,
        limit: u64,
    ) -> Result<VolumePage>;
}

#[derive(Serialize)]
struct MarketsStateRequest<'a> {
    addresses: Vec<&'a str>,
}

/// `MarketReader` over the JSON view gateway that fronts the ledger contracts.
pub struct HttpMarketReader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMarketReader {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketReader for HttpMarketReader {
    async fn get_markets_state(&self, keys: &[PollKey]) -> Result<Vec<RawMarketState>> {
        let url = format!("{}/markets/state", self.base_url);
        let body = MarketsStateRequest {
            addresses: keys.iter().map(PollKey::as_str).collect(),
        };

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            // Oversized batches come back as 413/400 and must feed the retry path.
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::Remote(format!("{status} for {} keys: {text}", keys.len())));
        }

        let states: Vec<RawMarketState> = serde_json::from_slice(&resp.bytes().await?)?;
        debug!(keys = keys.len(), slots = states.len(), "GetMarketsState ok");
        Ok(states)
    }

    async fn get_paginated_volume(
        &self,
        market_address: &str,
        offset: u64,
        limit: u64,
    ) -> Result<VolumePage> {
        let url = format!(
            "{}/markets/{}/volume?offset={}&limit={}",
            self.base_url, market_address, offset, limit
        );

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Remote(format!("{status} for volume page of {market_address}")));
        }
        Ok(serde_json::from_slice(&resp.bytes().await?)?)
    }
}
