//! Rolling per-pair price buffer
//!
//! Fixed-capacity ring of the most recent samples for each pair, in arrival
//! order. Volatility is the population standard deviation of the buffered
//! prices as a percentage of their mean.

use std::collections::{HashMap, VecDeque};

use crate::models::PricePoint;

/// Samples retained per pair
pub const PRICE_BUFFER_CAPACITY: usize = 10;

#[derive(Debug, Default, Clone)]
pub struct PriceBuffer {
    rings: HashMap<String, VecDeque<PricePoint>>,
}

impl PriceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, evicting the oldest once the ring is full
    pub fn push(&mut self, pair_id: &str, point: PricePoint) {
        let ring = self
            .rings
            .entry(pair_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(PRICE_BUFFER_CAPACITY));

        if ring.len() >= PRICE_BUFFER_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(point);
    }

    pub fn last(&self, pair_id: &str) -> Option<&PricePoint> {
        self.rings.get(pair_id).and_then(|r| r.back())
    }

    pub fn latest_price(&self, pair_id: &str) -> Option<f64> {
        self.last(pair_id).map(|p| p.price)
    }

    pub fn len(&self, pair_id: &str) -> usize {
        self.rings.get(pair_id).map(|r| r.len()).unwrap_or(0)
    }

    pub fn points(&self, pair_id: &str) -> Vec<PricePoint> {
        self.rings
            .get(pair_id)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn pair_ids(&self) -> impl Iterator<Item = &str> {
        self.rings.keys().map(|k| k.as_str())
    }

    /// Population std-dev / mean x 100. Zero with fewer than 2 samples.
    pub fn volatility(&self, pair_id: &str) -> f64 {
        let Some(ring) = self.rings.get(pair_id) else {
            return 0.0;
        };
        if ring.len() < 2 {
            return 0.0;
        }

        let n = ring.len() as f64;
        let mean = ring.iter().map(|p| p.price).sum::<f64>() / n;
        if mean == 0.0 {
            return 0.0;
        }
        let variance = ring.iter().map(|p| (p.price - mean).powi(2)).sum::<f64>() / n;

        (variance.sqrt() / mean) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn point(secs: i64, price: f64) -> PricePoint {
        PricePoint::new(Utc::now() + Duration::seconds(secs), price)
    }

    #[test]
    fn test_eleventh_push_evicts_oldest() {
        let mut buffer = PriceBuffer::new();
        for i in 0..PRICE_BUFFER_CAPACITY {
            buffer.push("A/B", point(i as i64, 100.0 + i as f64));
        }
        assert_eq!(buffer.len("A/B"), PRICE_BUFFER_CAPACITY);

        buffer.push("A/B", point(99, 500.0));
        let points = buffer.points("A/B");
        assert_eq!(points.len(), PRICE_BUFFER_CAPACITY);
        assert_eq!(points[0].price, 101.0);
        assert_eq!(points.last().unwrap().price, 500.0);
    }

    #[test]
    fn test_volatility_needs_two_samples() {
        let mut buffer = PriceBuffer::new();
        assert_eq!(buffer.volatility("A/B"), 0.0);
        buffer.push("A/B", point(0, 100.0));
        assert_eq!(buffer.volatility("A/B"), 0.0);
    }

    #[test]
    fn test_volatility_population_stddev() {
        let mut buffer = PriceBuffer::new();
        buffer.push("A/B", point(0, 99.0));
        buffer.push("A/B", point(1, 101.0));
        // mean 100, population std-dev 1 -> 1%
        assert!((buffer.volatility("A/B") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_pair_is_empty_not_error() {
        let buffer = PriceBuffer::new();
        assert_eq!(buffer.len("X/Y"), 0);
        assert!(buffer.last("X/Y").is_none());
        assert!(buffer.points("X/Y").is_empty());
    }

    #[test]
    fn test_pairs_are_isolated() {
        let mut buffer = PriceBuffer::new();
        buffer.push("A/B", point(0, 1.0));
        buffer.push("C/D", point(0, 2.0));
        assert_eq!(buffer.latest_price("A/B"), Some(1.0));
        assert_eq!(buffer.latest_price("C/D"), Some(2.0));
    }
}
