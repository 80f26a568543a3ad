//! Pre-loaded quote sequences
//!
//! Replays a fixed price path per pair, then repeats the last price. A pair
//! marked unavailable fails every fetch. Used for replays and integration runs.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{EngineError, EngineResult};
use crate::sources::{PriceQuote, PriceSource};

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<(f64, Option<(f64, f64)>)>>,
    last: HashMap<String, (f64, Option<(f64, f64)>)>,
    unavailable: HashSet<String>,
}

pub struct ScriptedPriceSource {
    name: String,
    script: Mutex<Script>,
}

impl ScriptedPriceSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(Script::default()),
        }
    }

    /// Queue prices for a pair. `reserves` is attached to every quote.
    pub fn push_prices(&self, pair_id: &str, prices: &[f64], reserves: Option<(f64, f64)>) {
        let mut script = self.script.lock();
        let queue = script.queued.entry(pair_id.to_string()).or_default();
        queue.extend(prices.iter().map(|p| (*p, reserves)));
    }

    pub fn set_unavailable(&self, pair_id: &str, unavailable: bool) {
        let mut script = self.script.lock();
        if unavailable {
            script.unavailable.insert(pair_id.to_string());
        } else {
            script.unavailable.remove(pair_id);
        }
    }
}

#[async_trait]
impl PriceSource for ScriptedPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_price(&self, pair_id: &str) -> EngineResult<PriceQuote> {
        let mut script = self.script.lock();
        if script.unavailable.contains(pair_id) {
            return Err(EngineError::source_unavailable(
                &self.name,
                pair_id,
                "marked unavailable",
            ));
        }

        let queued = script.queued.get_mut(pair_id).and_then(|q| q.pop_front());
        let next = queued.or_else(|| script.last.get(pair_id).copied());

        let Some((price, reserves)) = next else {
            return Err(EngineError::source_unavailable(
                &self.name,
                pair_id,
                "no quotes scripted",
            ));
        };
        script.last.insert(pair_id.to_string(), (price, reserves));

        Ok(PriceQuote {
            price,
            reserves,
            raw_response: format!("{{\"price\":{}}}", price),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_holds_last() {
        let source = ScriptedPriceSource::new("replay");
        source.push_prices("A/B", &[100.0, 100.6], None);

        assert_eq!(source.fetch_price("A/B").await.unwrap().price, 100.0);
        assert_eq!(source.fetch_price("A/B").await.unwrap().price, 100.6);
        assert_eq!(source.fetch_price("A/B").await.unwrap().price, 100.6);
    }

    #[tokio::test]
    async fn test_unavailable_pair_fails() {
        let source = ScriptedPriceSource::new("replay");
        assert!(source.fetch_price("A/B").await.is_err());

        source.push_prices("A/B", &[1.0], None);
        source.set_unavailable("A/B", true);
        let err = source.fetch_price("A/B").await.unwrap_err();
        assert_eq!(err.decision_result(), "source-error");
    }
}
