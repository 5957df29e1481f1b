//! Last-value price cache shared by all feeds.
//!
//! Every feed owns its own concurrent table, so writes from different feeds
//! never contend. Readers take per-feed snapshots.

use basis_core::{CanonicalCoin, Exchange, FeedId, FundingInfo, MarketKind};
use dashmap::DashMap;
use std::collections::HashMap;

/// Point-in-time copy of one feed's prices.
pub type PriceSnapshot = HashMap<CanonicalCoin, f64>;

/// Point-in-time copy of one exchange's funding table.
pub type FundingSnapshot = HashMap<CanonicalCoin, FundingInfo>;

/// Thread-safe price cache for all (exchange, kind) feeds.
#[derive(Debug)]
pub struct PriceCache {
    /// One table per feed, created up front and never removed.
    prices: HashMap<FeedId, DashMap<CanonicalCoin, f64>>,
    /// Funding info per exchange, written by the futures feed.
    funding: HashMap<Exchange, DashMap<CanonicalCoin, FundingInfo>>,
}

impl PriceCache {
    pub fn new() -> Self {
        let prices = FeedId::all()
            .into_iter()
            .map(|feed| (feed, DashMap::new()))
            .collect();
        let funding = Exchange::all()
            .iter()
            .map(|&exchange| (exchange, DashMap::new()))
            .collect();
        Self { prices, funding }
    }

    fn table(&self, exchange: Exchange, kind: MarketKind) -> Option<&DashMap<CanonicalCoin, f64>> {
        self.prices.get(&FeedId::new(exchange, kind))
    }

    /// Overwrite the last price of a coin. Non-positive prices are ignored.
    pub fn set(&self, exchange: Exchange, kind: MarketKind, coin: CanonicalCoin, price: f64) {
        if !(price > 0.0 && price.is_finite()) {
            return;
        }
        if let Some(table) = self.table(exchange, kind) {
            table.insert(coin, price);
        }
    }

    /// Snapshot of one feed's prices.
    pub fn get(&self, exchange: Exchange, kind: MarketKind) -> PriceSnapshot {
        self.table(exchange, kind)
            .map(|table| {
                table
                    .iter()
                    .map(|entry| (entry.key().clone(), *entry.value()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Last price of a single coin.
    pub fn get_price(&self, exchange: Exchange, kind: MarketKind, coin: &str) -> Option<f64> {
        self.table(exchange, kind)?.get(coin).map(|r| *r)
    }

    pub fn set_funding(&self, exchange: Exchange, coin: CanonicalCoin, info: FundingInfo) {
        if !info.rate.is_finite() {
            return;
        }
        if let Some(table) = self.funding.get(&exchange) {
            table.insert(coin, info);
        }
    }

    /// Snapshot of one exchange's funding table.
    pub fn funding(&self, exchange: Exchange) -> FundingSnapshot {
        self.funding
            .get(&exchange)
            .map(|table| {
                table
                    .iter()
                    .map(|entry| (entry.key().clone(), *entry.value()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of coins cached for a feed.
    pub fn len(&self, exchange: Exchange, kind: MarketKind) -> usize {
        self.table(exchange, kind).map(|t| t.len()).unwrap_or(0)
    }

    /// True when no feed has written anything yet.
    pub fn is_empty(&self) -> bool {
        self.prices.values().all(|t| t.is_empty())
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_core::normalize;
    use std::sync::Arc;

    fn coin(s: &str) -> CanonicalCoin {
        normalize(s).unwrap()
    }

    #[test]
    fn test_cache_set_and_get() {
        let cache = PriceCache::new();
        cache.set(Exchange::Binance, MarketKind::Spot, coin("BTC"), 50000.0);
        cache.set(Exchange::Binance, MarketKind::Futures, coin("BTC"), 50100.0);

        let spot = cache.get(Exchange::Binance, MarketKind::Spot);
        assert_eq!(spot.len(), 1);
        assert_eq!(spot.get("BTC"), Some(&50000.0));
        assert_eq!(
            cache.get_price(Exchange::Binance, MarketKind::Futures, "BTC"),
            Some(50100.0)
        );
        assert!(cache.get(Exchange::Bybit, MarketKind::Spot).is_empty());
    }

    #[test]
    fn test_cache_keeps_latest_write() {
        let cache = PriceCache::new();
        // 1000PEPE and 10000PEPE collapse into one entry
        cache.set(Exchange::Bybit, MarketKind::Futures, coin("1000PEPE"), 0.011);
        cache.set(Exchange::Bybit, MarketKind::Futures, coin("10000PEPE"), 0.012);

        assert_eq!(cache.len(Exchange::Bybit, MarketKind::Futures), 1);
        assert_eq!(
            cache.get_price(Exchange::Bybit, MarketKind::Futures, "PEPE"),
            Some(0.012)
        );
    }

    #[test]
    fn test_cache_ignores_non_positive_prices() {
        let cache = PriceCache::new();
        cache.set(Exchange::GateIO, MarketKind::Spot, coin("ETH"), 0.0);
        cache.set(Exchange::GateIO, MarketKind::Spot, coin("ETH"), -1.0);
        cache.set(Exchange::GateIO, MarketKind::Spot, coin("ETH"), f64::NAN);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let cache = PriceCache::new();
        cache.set(Exchange::Binance, MarketKind::Spot, coin("SOL"), 100.0);
        let snapshot = cache.get(Exchange::Binance, MarketKind::Spot);

        cache.set(Exchange::Binance, MarketKind::Spot, coin("SOL"), 101.0);
        assert_eq!(snapshot.get("SOL"), Some(&100.0));
    }

    #[test]
    fn test_funding_table() {
        let cache = PriceCache::new();
        cache.set_funding(Exchange::Bybit, coin("BTC"), FundingInfo::new(0.0001, Some(1)));
        let funding = cache.funding(Exchange::Bybit);
        assert_eq!(funding.get("BTC").map(|f| f.rate), Some(0.0001));
        assert!(cache.funding(Exchange::Binance).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_and_readers() {
        let cache = Arc::new(PriceCache::new());
        let mut handles = Vec::new();

        for feed in FeedId::all() {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 1..=500u32 {
                    cache.set(feed.exchange, feed.kind, coin(&format!("C{}", i % 50)), i as f64);
                }
            }));
        }

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let snapshot = cache.get(Exchange::Binance, MarketKind::Spot);
                    assert!(snapshot.values().all(|p| *p > 0.0));
                    tokio::task::yield_now().await;
                }
            })
        };

        for handle in handles {
            handle.await.unwrap();
        }
        reader.await.unwrap();

        for feed in FeedId::all() {
            assert_eq!(cache.len(feed.exchange, feed.kind), 50);
        }
    }
}
