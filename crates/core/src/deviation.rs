//! Spot/futures deviation and funding types.

use crate::CanonicalCoin;
use serde::{Deserialize, Serialize};

/// Shown when a futures feed has not published a funding time for a coin.
pub const DEFAULT_FUNDING_LABEL: &str = "8h";

/// Latest funding information published by a futures feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingInfo {
    /// Funding rate as a fraction (0.0001 = 0.01%).
    pub rate: f64,
    /// Next funding instant, unix milliseconds.
    pub next_funding_ms: Option<u64>,
}

impl FundingInfo {
    pub fn new(rate: f64, next_funding_ms: Option<u64>) -> Self {
        Self {
            rate,
            next_funding_ms,
        }
    }

    #[inline]
    pub fn rate_percent(&self) -> f64 {
        self.rate * 100.0
    }

    /// Time left until the next funding, formatted relative to `now_ms`.
    pub fn time_to_next(&self, now_ms: u64) -> String {
        match self.next_funding_ms {
            Some(next) => format_time_to_funding(next.saturating_sub(now_ms)),
            None => DEFAULT_FUNDING_LABEL.to_string(),
        }
    }
}

/// Format a remaining duration as whole hours and whole minutes ("3h 07m").
pub fn format_time_to_funding(remaining_ms: u64) -> String {
    let total_minutes = remaining_ms / 60_000;
    format!("{}h {:02}m", total_minutes / 60, total_minutes % 60)
}

/// Percentage gap of futures over spot: (futures - spot) / spot * 100.
///
/// Positive means futures trade above spot. Returns `None` when either price
/// is not strictly positive.
#[inline]
pub fn deviation_percent(spot: f64, futures: f64) -> Option<f64> {
    if spot > 0.0 && futures > 0.0 {
        Some((futures - spot) / spot * 100.0)
    } else {
        None
    }
}

/// One coin's spot/futures gap on one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub coin: CanonicalCoin,
    pub spot_price: f64,
    pub futures_price: f64,
    /// (futures - spot) / spot * 100
    pub deviation_percent: f64,
    pub funding_rate_percent: f64,
    pub time_to_next_funding: String,
}

impl Deviation {
    #[inline]
    pub fn abs_percent(&self) -> f64 {
        self.deviation_percent.abs()
    }

    /// Signed percentage with two decimals, "+" shown for positive gaps.
    pub fn signed_percent(&self) -> String {
        if self.deviation_percent > 0.0 {
            format!("+{:.2}%", self.deviation_percent)
        } else {
            format!("{:.2}%", self.deviation_percent)
        }
    }
}
