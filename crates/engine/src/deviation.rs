//! Spot/futures deviation ranking.
//!
//! Joins one exchange's spot and futures price caches on the canonical coin
//! and ranks the gaps, largest first.

use basis_core::{
    deviation_percent, Deviation, EnabledExchanges, Exchange, MarketKind,
    DEFAULT_FUNDING_LABEL,
};
use basis_feeds::{FundingSnapshot, PriceCache, PriceSnapshot};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Gaps wider than this are treated as bad or stale data.
pub const MAX_ABS_DEVIATION_PERCENT: f64 = 20.0;

/// Rank the spot/futures gaps of one exchange.
///
/// Pure function of its inputs: only coins present in both snapshots with
/// positive prices are considered, outliers beyond
/// [`MAX_ABS_DEVIATION_PERCENT`] are dropped, and the result is ordered by
/// absolute deviation (descending), then by coin.
pub fn compute_from_snapshots(
    spot: &PriceSnapshot,
    futures: &PriceSnapshot,
    funding: &FundingSnapshot,
    now_ms: u64,
) -> Vec<Deviation> {
    let mut deviations: Vec<Deviation> = spot
        .iter()
        .filter_map(|(coin, &spot_price)| {
            let futures_price = *futures.get(coin)?;
            let percent = deviation_percent(spot_price, futures_price)?;
            if !percent.is_finite() || percent.abs() > MAX_ABS_DEVIATION_PERCENT {
                return None;
            }

            let (funding_rate_percent, time_to_next_funding) = match funding.get(coin) {
                Some(info) => (info.rate_percent(), info.time_to_next(now_ms)),
                None => (0.0, DEFAULT_FUNDING_LABEL.to_string()),
            };

            Some(Deviation {
                coin: coin.clone(),
                spot_price,
                futures_price,
                deviation_percent: percent,
                funding_rate_percent,
                time_to_next_funding,
            })
        })
        .collect();

    deviations.sort_by(rank);
    deviations
}

fn rank(a: &Deviation, b: &Deviation) -> Ordering {
    b.abs_percent()
        .total_cmp(&a.abs_percent())
        .then_with(|| a.coin.cmp(&b.coin))
}

/// Computes deviations on demand from the shared price cache.
#[derive(Debug, Clone)]
pub struct DeviationEngine {
    cache: Arc<PriceCache>,
}

impl DeviationEngine {
    pub fn new(cache: Arc<PriceCache>) -> Self {
        Self { cache }
    }

    /// Ranked deviations for one exchange, evaluated now.
    pub fn compute_deviations(&self, exchange: Exchange) -> Vec<Deviation> {
        self.compute_deviations_at(exchange, now_ms())
    }

    /// Ranked deviations for one exchange, funding times relative to `now_ms`.
    pub fn compute_deviations_at(&self, exchange: Exchange, now_ms: u64) -> Vec<Deviation> {
        let spot = self.cache.get(exchange, MarketKind::Spot);
        let futures = self.cache.get(exchange, MarketKind::Futures);
        let funding = self.cache.funding(exchange);

        let deviations = compute_from_snapshots(&spot, &futures, &funding, now_ms);
        debug!(
            "{}: {} spot, {} futures, {} deviations",
            exchange,
            spot.len(),
            futures.len(),
            deviations.len()
        );
        deviations
    }

    /// One entry per enabled exchange (possibly empty), in exchange order.
    pub fn get_all_deviations(&self, enabled: &EnabledExchanges) -> Vec<(Exchange, Vec<Deviation>)> {
        let now = now_ms();
        enabled
            .iter()
            .map(|exchange| (exchange, self.compute_deviations_at(exchange, now)))
            .collect()
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
