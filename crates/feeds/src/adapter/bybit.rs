use async_trait::async_trait;
use basis_core::{Exchange, FeedId, MarketKind};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{split_quote_suffix, AppPing, ExchangeAdapter};
use crate::message::parse_decimal;
use crate::{active_usdt_symbols, FeedError, MarketDiscovery, TickEvent};

/// Topics per subscribe request; Bybit rejects larger `args` arrays on spot.
const SUBSCRIBE_CHUNK: usize = 10;

pub struct BybitAdapter {
    kind: MarketKind,
}

/// Snapshot and delta frames share this layout; deltas omit unchanged fields.
#[derive(Debug, Deserialize)]
struct BybitTickerData {
    symbol: String,
    #[serde(rename = "lastPrice", default)]
    last_price: Option<String>,
    #[serde(rename = "fundingRate", default)]
    funding_rate: Option<String>,
    #[serde(rename = "nextFundingTime", default)]
    next_funding_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BybitMessage {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    data: Option<BybitTickerData>,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    ret_msg: Option<String>,
}

impl BybitAdapter {
    pub fn new(kind: MarketKind) -> Self {
        Self { kind }
    }

    fn ticker_events(&self, data: BybitTickerData) -> Vec<TickEvent> {
        let Some((base, quote)) = self.extract_base_quote(&data.symbol) else {
            return Vec::new();
        };

        let mut events = Vec::with_capacity(2);
        if let Some(price) = data.last_price.as_deref().and_then(parse_decimal) {
            events.push(TickEvent::price(base.clone(), quote.clone(), price));
        }
        if self.kind == MarketKind::Futures {
            if let Some(rate) = data.funding_rate.as_deref().and_then(parse_decimal) {
                let next = data
                    .next_funding_time
                    .as_deref()
                    .and_then(|t| t.parse::<u64>().ok())
                    .filter(|&t| t > 0);
                events.push(TickEvent::funding(base, quote, rate, next));
            }
        }
        events
    }
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn feed(&self) -> FeedId {
        FeedId::new(Exchange::Bybit, self.kind)
    }

    fn ws_url(&self) -> &str {
        match self.kind {
            MarketKind::Spot => "wss://stream.bybit.com/v5/public/spot",
            MarketKind::Futures => "wss://stream.bybit.com/v5/public/linear",
        }
    }

    fn extract_base_quote(&self, symbol: &str) -> Option<(String, String)> {
        const QUOTES: &[&str] = &["USDT", "USDC"];
        split_quote_suffix(symbol, QUOTES)
    }

    async fn subscribe_messages(
        &self,
        discovery: &MarketDiscovery,
    ) -> Result<Vec<String>, FeedError> {
        let markets = discovery.fetch_bybit(self.kind).await?;
        let symbols = active_usdt_symbols(&markets);
        if symbols.is_empty() {
            return Err(FeedError::Discovery(format!(
                "Bybit {}: no tradable USDT instruments",
                self.kind
            )));
        }

        let messages: Vec<String> = symbols
            .chunks(SUBSCRIBE_CHUNK)
            .map(|chunk| {
                let topics: Vec<String> = chunk.iter().map(|s| format!("tickers.{}", s)).collect();
                serde_json::json!({ "op": "subscribe", "args": topics }).to_string()
            })
            .collect();

        debug!(
            "Bybit {}: {} symbols in {} subscribe messages",
            self.kind,
            symbols.len(),
            messages.len()
        );
        Ok(messages)
    }

    fn app_ping(&self) -> Option<AppPing> {
        Some(AppPing {
            interval: Duration::from_secs(20),
        })
    }

    fn ping_message(&self) -> Option<String> {
        Some(r#"{"op":"ping"}"#.to_string())
    }

    fn parse_message(&self, text: &str) -> Result<Vec<TickEvent>, FeedError> {
        let msg: BybitMessage = serde_json::from_str(text)?;

        if msg.op.as_deref() == Some("subscribe") && msg.success == Some(false) {
            return Err(FeedError::SubscriptionFailed(
                msg.ret_msg.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        match (msg.topic, msg.data) {
            (Some(topic), Some(data)) if topic.starts_with("tickers.") => {
                Ok(self.ticker_events(data))
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_spot_ticker() {
        let adapter = BybitAdapter::new(MarketKind::Spot);
        let json = r#"{"topic":"tickers.BTCUSDT","ts":1673853746003,"type":"snapshot","cs":2588407389,
            "data":{"symbol":"BTCUSDT","lastPrice":"21109.77","highPrice24h":"21426.99","lowPrice24h":"20575",
            "prevPrice24h":"20704.93","volume24h":"6780.866843","turnover24h":"141946527.22907118",
            "price24hPcnt":"0.0196","usdIndexPrice":"21120.2400136"}}"#;

        let events = adapter.parse_message(json).unwrap();
        assert_eq!(events, vec![TickEvent::price("BTC", "USDT", 21109.77)]);
    }

    #[test]
    fn test_parse_linear_ticker_with_funding() {
        let adapter = BybitAdapter::new(MarketKind::Futures);
        let json = r#"{"topic":"tickers.1000PEPEUSDT","type":"snapshot","ts":1673272861686,"cs":24987956059,
            "data":{"symbol":"1000PEPEUSDT","tickDirection":"PlusTick","lastPrice":"0.011",
            "fundingRate":"-0.000212","nextFundingTime":"1673280000000","markPrice":"0.0110"}}"#;

        let events = adapter.parse_message(json).unwrap();
        assert_eq!(
            events,
            vec![
                TickEvent::price("1000PEPE", "USDT", 0.011),
                TickEvent::funding("1000PEPE", "USDT", -0.000212, Some(1673280000000)),
            ]
        );
    }

    #[test]
    fn test_parse_delta_without_price() {
        let adapter = BybitAdapter::new(MarketKind::Futures);
        let json = r#"{"topic":"tickers.BTCUSDT","type":"delta","ts":1673272861686,
            "data":{"symbol":"BTCUSDT","markPrice":"17217.33","indexPrice":"17227.36"}}"#;
        assert!(adapter.parse_message(json).unwrap().is_empty());

        let json = r#"{"topic":"tickers.BTCUSDT","type":"delta","ts":1673272861686,
            "data":{"symbol":"BTCUSDT","fundingRate":"0.0001"}}"#;
        assert_eq!(
            adapter.parse_message(json).unwrap(),
            vec![TickEvent::funding("BTC", "USDT", 0.0001, None)]
        );
    }

    #[test]
    fn test_spot_ignores_funding_fields() {
        let adapter = BybitAdapter::new(MarketKind::Spot);
        let json = r#"{"topic":"tickers.ETHUSDT","data":{"symbol":"ETHUSDT","lastPrice":"1500","fundingRate":"0.1"}}"#;
        assert_eq!(
            adapter.parse_message(json).unwrap(),
            vec![TickEvent::price("ETH", "USDT", 1500.0)]
        );
    }

    #[test]
    fn test_control_messages_yield_nothing() {
        let adapter = BybitAdapter::new(MarketKind::Spot);
        let ack = r#"{"success":true,"ret_msg":"subscribe","conn_id":"2324d924","op":"subscribe"}"#;
        let pong = r#"{"success":true,"ret_msg":"pong","conn_id":"0970e817","op":"ping"}"#;
        let spot_pong = r#"{"op":"pong","args":["1675418560633"],"conn_id":"cfcb4ocsvfriu23r3er0"}"#;
        for msg in [ack, pong, spot_pong] {
            assert!(adapter.parse_message(msg).unwrap().is_empty());
        }
    }

    #[test]
    fn test_rejected_subscription() {
        let adapter = BybitAdapter::new(MarketKind::Spot);
        let nack = r#"{"success":false,"ret_msg":"Invalid symbol :[tickers.FOOUSDT]","op":"subscribe"}"#;
        assert!(matches!(
            adapter.parse_message(nack),
            Err(FeedError::SubscriptionFailed(_))
        ));
    }

    #[test]
    fn test_app_ping() {
        let adapter = BybitAdapter::new(MarketKind::Futures);
        assert_eq!(adapter.app_ping().map(|p| p.interval), Some(Duration::from_secs(20)));
        assert_eq!(adapter.ping_message().as_deref(), Some(r#"{"op":"ping"}"#));
    }
}
