//! JSON-over-HTTP price connector

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::sources::{PriceQuote, PriceSource};

/// `GET {base_url}/price/{pair_id}` response body
#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: f64,
    #[serde(default)]
    reserves: Option<(f64, f64)>,
    /// Unix millis; receive time is used when absent
    #[serde(default)]
    timestamp: Option<i64>,
}

pub struct HttpPriceSource {
    name: String,
    base_url: String,
    client: Client,
}

impl HttpPriceSource {
    pub fn new(name: &str, base_url: &str, timeout_ms: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url_for(&self, pair_id: &str) -> EngineResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            EngineError::source_unavailable(&self.name, pair_id, format!("bad base url: {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                EngineError::source_unavailable(&self.name, pair_id, "base url cannot be a base")
            })?
            .pop_if_empty()
            .push("price")
            .push(pair_id);
        Ok(url)
    }

    fn unavailable(&self, pair_id: &str, reason: impl ToString) -> EngineError {
        EngineError::source_unavailable(&self.name, pair_id, reason.to_string())
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_price(&self, pair_id: &str) -> EngineResult<PriceQuote> {
        let url = self.url_for(pair_id)?;
        debug!(source = %self.name, %url, "Fetching price");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.unavailable(pair_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(pair_id, format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.unavailable(pair_id, e))?;
        let parsed: PriceResponse = serde_json::from_str(&body)
            .map_err(|e| self.unavailable(pair_id, format!("malformed body: {e}")))?;

        if !(parsed.price.is_finite() && parsed.price > 0.0) {
            return Err(self.unavailable(pair_id, format!("bad price {}", parsed.price)));
        }

        let timestamp = parsed
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Ok(PriceQuote {
            price: parsed.price,
            reserves: parsed.reserves,
            raw_response: body,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_id_is_path_encoded() {
        let source = HttpPriceSource::new("kong", "http://localhost:8080/api/", 1_000);
        let url = source.url_for("ICP/ckBTC").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/price/ICP%2FckBTC");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_source_unavailable() {
        let source = HttpPriceSource::new("kong", "http://127.0.0.1:9", 200);
        let err = source.fetch_price("ICP/ckBTC").await.unwrap_err();
        assert!(matches!(err, EngineError::SourceUnavailable { .. }));
    }
}
