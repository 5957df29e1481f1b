//! Exchange adapter trait and implementations.
//!
//! Each exchange has its own WebSocket message format.
//! Adapters turn these into [`TickEvent`]s; the feed does the rest.

mod binance;
mod bybit;
mod gateio;

pub use binance::BinanceAdapter;
pub use bybit::BybitAdapter;
pub use gateio::GateIOAdapter;

use crate::{FeedError, MarketDiscovery, TickEvent};
use async_trait::async_trait;
use basis_core::{Exchange, FeedId};
use std::sync::Arc;
use std::time::Duration;

/// Application-level keep-alive some exchanges require on top of WebSocket pings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppPing {
    pub interval: Duration,
}

/// Trait for exchange-specific WebSocket adapters.
///
/// All adapters share common patterns for:
/// - Extracting base/quote symbols from exchange-specific formats
/// - Parsing WebSocket messages into tick events
/// - Generating subscription messages
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Feed this adapter serves.
    fn feed(&self) -> FeedId;

    /// Get WebSocket URL for this feed.
    fn ws_url(&self) -> &str;

    /// Extract base and quote symbols from exchange-specific format.
    /// Returns (base, quote) tuple, e.g., ("BTC", "USDT")
    fn extract_base_quote(&self, symbol: &str) -> Option<(String, String)>;

    /// Messages to send right after connecting. Exchanges without an
    /// all-symbols topic discover their instruments first.
    async fn subscribe_messages(
        &self,
        discovery: &MarketDiscovery,
    ) -> Result<Vec<String>, FeedError>;

    /// Application ping schedule, if the exchange needs one.
    fn app_ping(&self) -> Option<AppPing> {
        None
    }

    /// Body of one application ping.
    fn ping_message(&self) -> Option<String> {
        None
    }

    /// Parse one text frame. Control frames (acks, pongs) yield no events.
    fn parse_message(&self, text: &str) -> Result<Vec<TickEvent>, FeedError>;
}

/// Adapter for one (exchange, kind) feed.
pub fn adapter_for(feed: FeedId) -> Arc<dyn ExchangeAdapter> {
    match feed.exchange {
        Exchange::Binance => Arc::new(BinanceAdapter::new(feed.kind)),
        Exchange::Bybit => Arc::new(BybitAdapter::new(feed.kind)),
        Exchange::GateIO => Arc::new(GateIOAdapter::new(feed.kind)),
    }
}

/// Split a concatenated symbol ("BTCUSDT") on a known quote suffix.
pub(crate) fn split_quote_suffix(symbol: &str, quotes: &[&str]) -> Option<(String, String)> {
    let symbol = symbol.to_uppercase();
    quotes.iter().find_map(|quote| {
        symbol
            .strip_suffix(quote)
            .filter(|base| !base.is_empty())
            .map(|base| (base.to_string(), (*quote).to_string()))
    })
}
