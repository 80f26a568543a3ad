//! Random-walk AMM quotes for local runs

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use crate::error::EngineResult;
use crate::sources::{PriceQuote, PriceSource};

const START_PRICE: f64 = 1.0;
const BASE_RESERVE: f64 = 400_000.0;
/// Max per-fetch move, percent
const MAX_STEP_PCT: f64 = 0.8;

struct WalkState {
    rng: StdRng,
    prices: HashMap<String, f64>,
}

pub struct SimulatedPriceSource {
    name: String,
    state: Mutex<WalkState>,
}

impl SimulatedPriceSource {
    /// Seeded from the source name so two sources drift apart while a
    /// restart replays the same path.
    pub fn new(name: &str) -> Self {
        let seed = name
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
            });
        Self::with_seed(name, seed)
    }

    pub fn with_seed(name: &str, seed: u64) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(WalkState {
                rng: StdRng::seed_from_u64(seed),
                prices: HashMap::new(),
            }),
        }
    }
}

#[async_trait]
impl PriceSource for SimulatedPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_price(&self, pair_id: &str) -> EngineResult<PriceQuote> {
        let mut state = self.state.lock();
        let step = state.rng.gen_range(-MAX_STEP_PCT..=MAX_STEP_PCT) / 100.0;
        let price = {
            let entry = state
                .prices
                .entry(pair_id.to_string())
                .or_insert(START_PRICE);
            *entry = (*entry * (1.0 + step)).max(f64::EPSILON);
            *entry
        };
        let base_reserve = BASE_RESERVE * state.rng.gen_range(0.9..1.1);
        let reserves = (base_reserve, base_reserve * price);

        let raw_response = serde_json::json!({
            "source": self.name,
            "pair": pair_id,
            "price": price,
            "reserves": [reserves.0, reserves.1],
        })
        .to_string();

        Ok(PriceQuote {
            price,
            reserves: Some(reserves),
            raw_response,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_walk_is_bounded_and_reproducible() {
        let a = SimulatedPriceSource::new("ICPSwap");
        let b = SimulatedPriceSource::new("ICPSwap");

        let mut last = START_PRICE;
        for _ in 0..20 {
            let qa = a.fetch_price("ICP/ckBTC").await.unwrap();
            let qb = b.fetch_price("ICP/ckBTC").await.unwrap();
            assert_eq!(qa.price, qb.price);
            let step = ((qa.price - last) / last * 100.0).abs();
            assert!(step <= MAX_STEP_PCT + 1e-9);
            assert!(qa.reserves.is_some());
            last = qa.price;
        }
    }
}
