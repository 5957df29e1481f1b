use async_trait::async_trait;
use basis_core::{Exchange, FeedId, MarketKind};
use serde::Deserialize;

use super::{split_quote_suffix, ExchangeAdapter};
use crate::message::parse_decimal;
use crate::{FeedError, MarketDiscovery, TickEvent};

/// Binance streams every symbol through the `!miniTicker@arr` topic, so no
/// instrument discovery or subscribe message is needed.
pub struct BinanceAdapter {
    kind: MarketKind,
}

/// Combined-stream envelope: `{"stream": "...", "data": ...}`.
#[derive(Debug, Deserialize)]
struct CombinedStream {
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MiniTicker {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    close: String,
}

#[derive(Debug, Deserialize)]
struct MarkPrice {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "r", default)]
    funding_rate: String,
    #[serde(rename = "T", default)]
    next_funding_time: u64,
}

impl BinanceAdapter {
    const SPOT_URL: &'static str = "wss://stream.binance.com:9443/stream?streams=!miniTicker@arr";
    const FUTURES_URL: &'static str =
        "wss://fstream.binance.com/stream?streams=!miniTicker@arr/!markPrice@arr";

    pub fn new(kind: MarketKind) -> Self {
        Self { kind }
    }

    fn parse_mini_tickers(&self, data: serde_json::Value) -> Result<Vec<TickEvent>, FeedError> {
        let tickers: Vec<MiniTicker> = serde_json::from_value(data)?;
        Ok(tickers
            .into_iter()
            .filter_map(|t| {
                let (base, quote) = self.extract_base_quote(&t.symbol)?;
                let price = parse_decimal(&t.close)?;
                Some(TickEvent::price(base, quote, price))
            })
            .collect())
    }

    fn parse_mark_prices(&self, data: serde_json::Value) -> Result<Vec<TickEvent>, FeedError> {
        let marks: Vec<MarkPrice> = serde_json::from_value(data)?;
        Ok(marks
            .into_iter()
            .filter_map(|m| {
                let (base, quote) = self.extract_base_quote(&m.symbol)?;
                let rate = parse_decimal(&m.funding_rate)?;
                let next = (m.next_funding_time > 0).then_some(m.next_funding_time);
                Some(TickEvent::funding(base, quote, rate, next))
            })
            .collect())
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn feed(&self) -> FeedId {
        FeedId::new(Exchange::Binance, self.kind)
    }

    fn ws_url(&self) -> &str {
        match self.kind {
            MarketKind::Spot => Self::SPOT_URL,
            MarketKind::Futures => Self::FUTURES_URL,
        }
    }

    fn extract_base_quote(&self, symbol: &str) -> Option<(String, String)> {
        const QUOTES: &[&str] = &["FDUSD", "USDT", "USDC", "BUSD", "TUSD", "BTC", "ETH", "BNB"];
        split_quote_suffix(symbol, QUOTES)
    }

    async fn subscribe_messages(
        &self,
        _discovery: &MarketDiscovery,
    ) -> Result<Vec<String>, FeedError> {
        Ok(Vec::new())
    }

    fn parse_message(&self, text: &str) -> Result<Vec<TickEvent>, FeedError> {
        let envelope: CombinedStream = serde_json::from_str(text)?;
        let (Some(stream), Some(data)) = (envelope.stream, envelope.data) else {
            return Ok(Vec::new());
        };

        if stream.starts_with("!miniTicker") {
            self.parse_mini_tickers(data)
        } else if stream.starts_with("!markPrice") {
            self.parse_mark_prices(data)
        } else {
            Ok(Vec::new())
        }
    }
}
