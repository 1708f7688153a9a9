//! Data API Client
//!
//! REST access to historical candles and per-wallet trades.
//!
//! Every request carries the `x-api-key` header. A 429 response is retried
//! once after the configured delay; a second 429 is reported as
//! [`FetchError::RateLimited`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{FetchError, HistoricalFetcher, HistoryRequest, TradeHistory};
use crate::domain::market::{Bar, TradeRecord};
use crate::domain::resolution::resolve;
use crate::infrastructure::config::{ApiKey, ApiSettings};
use crate::infrastructure::metrics::{self, FetchOutcome};

const API_KEY_HEADER: &str = "x-api-key";

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    oclhv: Option<Vec<Option<Bar>>>,
}

#[derive(Debug, Default, Deserialize)]
struct TradesResponse {
    #[serde(default)]
    trades: Option<Vec<TradeRecord>>,
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the data API.
#[derive(Debug, Clone)]
pub struct DataApiClient {
    client: Client,
    base_url: String,
    api_key: ApiKey,
    rate_limit_retry_delay: Duration,
}

impl DataApiClient {
    /// Build a client from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(settings: &ApiSettings) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(settings.timeout).build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            rate_limit_retry_delay: settings.rate_limit_retry_delay,
        })
    }

    /// Base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Candles for a token/pool pair, falling back to the token-level chart
    /// when the pool chart is empty or fails.
    ///
    /// A rate-limited pool chart is not retried against the token chart.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::RateLimited`] from the pool chart, or any error
    /// from the token chart.
    pub async fn chart(&self, token: &str, pool: &str) -> Result<Vec<Bar>, FetchError> {
        match self.chart_at(&format!("/chart/{token}/{pool}")).await {
            Ok(bars) if !bars.is_empty() => return Ok(bars),
            Ok(_) => tracing::debug!(token, pool, "pool chart empty, trying token chart"),
            Err(FetchError::RateLimited) => return Err(FetchError::RateLimited),
            Err(e) => {
                tracing::warn!(token, pool, error = %e, "pool chart failed, trying token chart");
            }
        }

        self.chart_at(&format!("/chart/{token}")).await
    }

    /// Trades of a wallet on a token/pool pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is malformed.
    pub async fn trades(
        &self,
        token: &str,
        pool: &str,
        wallet: &str,
    ) -> Result<Vec<TradeRecord>, FetchError> {
        let response: TradesResponse = self.get(&format!("/trades/{token}/{pool}/{wallet}")).await?;
        Ok(response.trades.unwrap_or_default())
    }

    async fn chart_at(&self, path: &str) -> Result<Vec<Bar>, FetchError> {
        let response: ChartResponse = self.get(path).await?;
        Ok(response
            .oclhv
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect())
    }

    async fn get<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.base_url);
        let mut retried = false;

        loop {
            let response = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, self.api_key.expose())
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if retried {
                    return Err(FetchError::RateLimited);
                }
                retried = true;
                tracing::warn!(
                    path,
                    delay_ms = u64::try_from(self.rate_limit_retry_delay.as_millis())
                        .unwrap_or(u64::MAX),
                    "rate limited, retrying once"
                );
                tokio::time::sleep(self.rate_limit_retry_delay).await;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                });
            }

            let body = response.text().await?;
            if body.trim().is_empty() {
                return Ok(T::default());
            }
            return Ok(serde_json::from_str(&body)?);
        }
    }
}

/// The chart endpoint serves its full native series: it takes no resolution
/// or range, so `request.resolution`, `from` and `to` only shape the log line.
#[async_trait]
impl HistoricalFetcher for DataApiClient {
    async fn fetch_bars(&self, request: &HistoryRequest) -> Result<Vec<Bar>, FetchError> {
        tracing::debug!(
            token = %request.token,
            pool = %request.pool,
            resolution = resolve(&request.resolution).upstream_token(),
            from = request.from,
            to = request.to,
            "fetching chart"
        );
        let result = self.chart(&request.token, &request.pool).await;
        let outcome = match &result {
            Ok(bars) if bars.is_empty() => FetchOutcome::NoData,
            Ok(_) => FetchOutcome::Bars,
            Err(_) => FetchOutcome::Error,
        };
        metrics::record_history_fetch(outcome);
        result
    }
}

#[async_trait]
impl TradeHistory for DataApiClient {
    async fn fetch_trades(
        &self,
        token: &str,
        pool: &str,
        wallet: &str,
    ) -> Result<Vec<TradeRecord>, FetchError> {
        self.trades(token, pool, wallet).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_response_skips_null_bars() {
        let body = r#"{"oclhv":[null,{"time":60,"open":1,"high":2,"low":0.5,"close":1.5,"volume":3}]}"#;
        let response: ChartResponse = serde_json::from_str(body).unwrap();
        let bars: Vec<Bar> = response.oclhv.unwrap().into_iter().flatten().collect();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].time, 60);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let chart: ChartResponse = serde_json::from_str(r#"{"oclhv":null}"#).unwrap();
        assert!(chart.oclhv.is_none());
        let trades: TradesResponse = serde_json::from_str("{}").unwrap();
        assert!(trades.trades.is_none());
    }

    #[test]
    fn trailing_slash_trimmed_by_settings() {
        let client = DataApiClient::new(&ApiSettings::new("http://localhost:9/", "k")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9");
    }
}
