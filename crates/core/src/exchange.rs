//! Exchange identifiers and market kinds.

use serde::{Deserialize, Serialize};

/// Market kind of a feed: spot or perpetual futures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    Spot,
    Futures,
}

impl MarketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MarketKind::Spot => "spot",
            MarketKind::Futures => "futures",
        }
    }

    pub fn all() -> &'static [MarketKind] {
        &[MarketKind::Spot, MarketKind::Futures]
    }
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Exchange {
    Binance,
    Bybit,
    GateIO,
}

impl Exchange {
    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Exchange::Binance => "Binance",
            Exchange::Bybit => "Bybit",
            Exchange::GateIO => "Gate.io",
        }
    }

    /// Lower-case key used in settings documents and aggregate results.
    pub fn key(self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Bybit => "bybit",
            Exchange::GateIO => "gate",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "binance" => Some(Exchange::Binance),
            "bybit" => Some(Exchange::Bybit),
            "gate" | "gateio" | "gate.io" => Some(Exchange::GateIO),
            _ => None,
        }
    }

    /// All supported exchanges, in reporting order.
    pub fn all() -> &'static [Exchange] {
        &[Exchange::Binance, Exchange::Bybit, Exchange::GateIO]
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exchange's one market kind. Identifies a single streaming feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedId {
    pub exchange: Exchange,
    pub kind: MarketKind,
}

impl FeedId {
    pub const fn new(exchange: Exchange, kind: MarketKind) -> Self {
        Self { exchange, kind }
    }

    /// Every (exchange, kind) combination: three exchanges by two kinds.
    pub fn all() -> Vec<FeedId> {
        Exchange::all()
            .iter()
            .flat_map(|&exchange| {
                MarketKind::all()
                    .iter()
                    .map(move |&kind| FeedId::new(exchange, kind))
            })
            .collect()
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.exchange.as_str(), self.kind.as_str())
    }
}

/// Per-exchange enable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledExchanges {
    pub binance: bool,
    pub bybit: bool,
    pub gate: bool,
}

impl Default for EnabledExchanges {
    fn default() -> Self {
        Self {
            binance: true,
            bybit: true,
            gate: true,
        }
    }
}

impl EnabledExchanges {
    pub fn none() -> Self {
        Self {
            binance: false,
            bybit: false,
            gate: false,
        }
    }

    pub fn is_enabled(&self, exchange: Exchange) -> bool {
        match exchange {
            Exchange::Binance => self.binance,
            Exchange::Bybit => self.bybit,
            Exchange::GateIO => self.gate,
        }
    }

    pub fn any(&self) -> bool {
        self.binance || self.bybit || self.gate
    }

    /// Enabled exchanges in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = Exchange> + '_ {
        Exchange::all()
            .iter()
            .copied()
            .filter(move |&e| self.is_enabled(e))
    }

    /// Feeds to run for the enabled exchanges (spot and futures for each).
    pub fn feeds(&self) -> Vec<FeedId> {
        FeedId::all()
            .into_iter()
            .filter(|feed| self.is_enabled(feed.exchange))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exchange_keys_round_trip() {
        for &exchange in Exchange::all() {
            assert_eq!(Exchange::from_key(exchange.key()), Some(exchange));
        }
        assert_eq!(Exchange::from_key("Gate.io"), Some(Exchange::GateIO));
        assert_eq!(Exchange::from_key("kraken"), None);
    }

    #[test]
    fn test_feed_id_all() {
        let feeds = FeedId::all();
        assert_eq!(feeds.len(), 6);
        assert_eq!(feeds[0], FeedId::new(Exchange::Binance, MarketKind::Spot));
        assert_eq!(feeds[5], FeedId::new(Exchange::GateIO, MarketKind::Futures));
    }

    #[test]
    fn test_feed_id_display() {
        let feed = FeedId::new(Exchange::GateIO, MarketKind::Futures);
        assert_eq!(feed.to_string(), "Gate.io/futures");
    }

    #[test]
    fn test_enabled_exchanges_feeds() {
        let flags = EnabledExchanges {
            binance: true,
            bybit: false,
            gate: true,
        };
        let feeds = flags.feeds();
        assert_eq!(feeds.len(), 4);
        assert!(feeds.iter().all(|f| f.exchange != Exchange::Bybit));
        assert_eq!(
            flags.iter().collect::<Vec<_>>(),
            vec![Exchange::Binance, Exchange::GateIO]
        );
    }

    #[test]
    fn test_enabled_exchanges_none() {
        let flags = EnabledExchanges::none();
        assert!(!flags.any());
        assert!(flags.feeds().is_empty());
    }
}
