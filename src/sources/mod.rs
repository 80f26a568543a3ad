//! Price source connectors
//! Mission: Hand the Sense stage one quote per (source, pair), or a typed failure

pub mod http;
pub mod scripted;
pub mod simulated;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{SourceConfig, SourceKind};
use crate::error::EngineResult;
use crate::models::PriceSnapshot;

pub use http::HttpPriceSource;
pub use scripted::ScriptedPriceSource;
pub use simulated::SimulatedPriceSource;

/// One quote from a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub price: f64,
    #[serde(default)]
    pub reserves: Option<(f64, f64)>,
    #[serde(default)]
    pub raw_response: String,
    pub timestamp: DateTime<Utc>,
}

impl PriceQuote {
    pub fn into_snapshot(self, dex_name: &str, pair_id: &str) -> PriceSnapshot {
        PriceSnapshot {
            timestamp: self.timestamp,
            dex_name: dex_name.to_string(),
            pair_id: pair_id.to_string(),
            price: self.price,
            reserves: self.reserves,
            raw_response: self.raw_response,
        }
    }
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fails with `EngineError::SourceUnavailable`
    async fn fetch_price(&self, pair_id: &str) -> EngineResult<PriceQuote>;
}

/// Build a source from config. HTTP sources without a base URL fall back to
/// simulation so a half-filled config still boots.
pub fn build_source(config: &SourceConfig) -> Arc<dyn PriceSource> {
    match (&config.kind, &config.base_url) {
        (SourceKind::Http, Some(url)) => {
            Arc::new(HttpPriceSource::new(&config.name, url, config.timeout_ms))
        }
        (SourceKind::Http, None) => {
            tracing::warn!(source = %config.name, "HTTP source without base_url, simulating");
            Arc::new(SimulatedPriceSource::new(&config.name))
        }
        (SourceKind::Simulated, _) => Arc::new(SimulatedPriceSource::new(&config.name)),
    }
}

/// Live and simulated source sets; the live flag picks which one Sense polls
#[derive(Clone, Default)]
pub struct SourceSet {
    pub live: Vec<Arc<dyn PriceSource>>,
    pub simulated: Vec<Arc<dyn PriceSource>>,
}

impl SourceSet {
    /// Split configured sources: HTTP ones are live, the rest simulated.
    /// With no simulated sources configured, each live source gets a
    /// simulated twin of the same name.
    pub fn from_configs(configs: &[SourceConfig]) -> Self {
        let mut set = SourceSet::default();
        for config in configs {
            match config.kind {
                SourceKind::Http => set.live.push(build_source(config)),
                SourceKind::Simulated => set.simulated.push(build_source(config)),
            }
        }
        if set.simulated.is_empty() {
            set.simulated = configs
                .iter()
                .map(|c| Arc::new(SimulatedPriceSource::new(&c.name)) as Arc<dyn PriceSource>)
                .collect();
        }
        set
    }

    pub fn active(&self, live: bool) -> &[Arc<dyn PriceSource>] {
        if live && !self.live.is_empty() {
            &self.live
        } else {
            &self.simulated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_set_split() {
        let set = SourceSet::from_configs(&[
            SourceConfig::simulated("ICPSwap"),
            SourceConfig::http("KongSwap", "http://127.0.0.1:9"),
        ]);
        assert_eq!(set.live.len(), 1);
        assert_eq!(set.simulated.len(), 1);
        assert_eq!(set.active(true)[0].name(), "KongSwap");
        assert_eq!(set.active(false)[0].name(), "ICPSwap");
    }

    #[test]
    fn test_live_without_live_sources_uses_simulated() {
        let set = SourceSet::from_configs(&[SourceConfig::simulated("ICPSwap")]);
        assert_eq!(set.active(true)[0].name(), "ICPSwap");
    }
}
