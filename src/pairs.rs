//! Pair config collaborator

use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::models::PairConfig;

pub trait PairConfigProvider: Send + Sync {
    fn get_pair_config(&self, pair_id: &str) -> Option<PairConfig>;

    fn pair_ids(&self) -> Vec<String>;
}

/// Pairs fixed at startup from `EngineConfig.pairs`
#[derive(Debug, Clone, Default)]
pub struct StaticPairConfigs {
    pairs: BTreeMap<String, PairConfig>,
}

impl StaticPairConfigs {
    pub fn new(pairs: &[PairConfig]) -> EngineResult<Self> {
        let mut map = BTreeMap::new();
        for pair in pairs {
            pair.validate()?;
            if map.insert(pair.pair_id.clone(), pair.clone()).is_some() {
                return Err(EngineError::Config(format!(
                    "duplicate pair {}",
                    pair.pair_id
                )));
            }
        }
        Ok(Self { pairs: map })
    }
}

impl PairConfigProvider for StaticPairConfigs {
    fn get_pair_config(&self, pair_id: &str) -> Option<PairConfig> {
        self.pairs.get(pair_id).cloned()
    }

    fn pair_ids(&self) -> Vec<String> {
        self.pairs.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_order() {
        let provider = StaticPairConfigs::new(&[
            PairConfig::new("ckETH", "ckUSDC", "eth-usdc", 30),
            PairConfig::new("ICP", "ckBTC", "icp-ckbtc", 25),
        ])
        .unwrap();

        assert_eq!(provider.pair_ids(), vec!["ICP/ckBTC", "ckETH/ckUSDC"]);
        assert_eq!(provider.get_pair_config("ICP/ckBTC").unwrap().fee_bps, 25);
        assert!(provider.get_pair_config("X/Y").is_none());
    }

    #[test]
    fn test_duplicates_rejected() {
        let pair = PairConfig::new("ICP", "ckBTC", "p", 30);
        assert!(StaticPairConfigs::new(&[pair.clone(), pair]).is_err());
    }
}
