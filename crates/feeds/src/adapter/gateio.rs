use async_trait::async_trait;
use basis_core::{Exchange, FeedId, MarketKind};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{AppPing, ExchangeAdapter};
use crate::message::parse_decimal;
use crate::{active_usdt_symbols, FeedError, MarketDiscovery, TickEvent};

const SUBSCRIBE_CHUNK: usize = 100;

pub struct GateIOAdapter {
    kind: MarketKind,
}

#[derive(Debug, Deserialize)]
struct GateSpotTicker {
    currency_pair: String,
    #[serde(default)]
    last: String,
}

#[derive(Debug, Deserialize)]
struct GateFuturesTicker {
    contract: String,
    #[serde(default)]
    last: String,
    #[serde(default)]
    funding_rate: String,
}

#[derive(Debug, Deserialize)]
struct GateError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct GateMessage {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    error: Option<GateError>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

impl GateIOAdapter {
    pub fn new(kind: MarketKind) -> Self {
        Self { kind }
    }

    fn channel(&self) -> &'static str {
        match self.kind {
            MarketKind::Spot => "spot.tickers",
            MarketKind::Futures => "futures.tickers",
        }
    }

    fn ping_channel(&self) -> &'static str {
        match self.kind {
            MarketKind::Spot => "spot.ping",
            MarketKind::Futures => "futures.ping",
        }
    }

    fn spot_events(&self, result: serde_json::Value) -> Result<Vec<TickEvent>, FeedError> {
        let ticker: GateSpotTicker = serde_json::from_value(result)?;
        let events = self
            .extract_base_quote(&ticker.currency_pair)
            .zip(parse_decimal(&ticker.last))
            .map(|((base, quote), price)| TickEvent::price(base, quote, price));
        Ok(events.into_iter().collect())
    }

    /// Futures ticker updates carry an array of contracts. Gate.io does not
    /// publish the next funding instant on this channel.
    fn futures_events(&self, result: serde_json::Value) -> Result<Vec<TickEvent>, FeedError> {
        let tickers: Vec<GateFuturesTicker> = serde_json::from_value(result)?;
        let mut events = Vec::with_capacity(tickers.len() * 2);
        for ticker in tickers {
            let Some((base, quote)) = self.extract_base_quote(&ticker.contract) else {
                continue;
            };
            if let Some(price) = parse_decimal(&ticker.last) {
                events.push(TickEvent::price(base.clone(), quote.clone(), price));
            }
            if let Some(rate) = parse_decimal(&ticker.funding_rate) {
                events.push(TickEvent::funding(base, quote, rate, None));
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl ExchangeAdapter for GateIOAdapter {
    fn feed(&self) -> FeedId {
        FeedId::new(Exchange::GateIO, self.kind)
    }

    fn ws_url(&self) -> &str {
        match self.kind {
            MarketKind::Spot => "wss://api.gateio.ws/ws/v4/",
            MarketKind::Futures => "wss://fx-ws.gateio.ws/v4/ws/usdt",
        }
    }

    fn extract_base_quote(&self, symbol: &str) -> Option<(String, String)> {
        let (base, quote) = symbol.split_once('_')?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some((base.to_uppercase(), quote.to_uppercase()))
    }

    async fn subscribe_messages(
        &self,
        discovery: &MarketDiscovery,
    ) -> Result<Vec<String>, FeedError> {
        let markets = discovery.fetch_gateio(self.kind).await?;
        let symbols = active_usdt_symbols(&markets);
        if symbols.is_empty() {
            return Err(FeedError::Discovery(format!(
                "Gate.io {}: no tradable USDT instruments",
                self.kind
            )));
        }

        let time = chrono::Utc::now().timestamp();
        let messages: Vec<String> = symbols
            .chunks(SUBSCRIBE_CHUNK)
            .map(|chunk| {
                serde_json::json!({
                    "time": time,
                    "channel": self.channel(),
                    "event": "subscribe",
                    "payload": chunk,
                })
                .to_string()
            })
            .collect();

        debug!(
            "Gate.io {}: {} symbols in {} subscribe messages",
            self.kind,
            symbols.len(),
            messages.len()
        );
        Ok(messages)
    }

    fn app_ping(&self) -> Option<AppPing> {
        Some(AppPing {
            interval: Duration::from_secs(10),
        })
    }

    fn ping_message(&self) -> Option<String> {
        let time = chrono::Utc::now().timestamp();
        Some(serde_json::json!({ "time": time, "channel": self.ping_channel() }).to_string())
    }

    fn parse_message(&self, text: &str) -> Result<Vec<TickEvent>, FeedError> {
        let msg: GateMessage = serde_json::from_str(text)?;

        if let Some(err) = msg.error {
            return Err(FeedError::SubscriptionFailed(format!(
                "{} {}: {}",
                msg.channel, err.code, err.message
            )));
        }
        if msg.channel != self.channel() || msg.event != "update" {
            return Ok(Vec::new());
        }
        let Some(result) = msg.result else {
            return Ok(Vec::new());
        };

        match self.kind {
            MarketKind::Spot => self.spot_events(result),
            MarketKind::Futures => self.futures_events(result),
        }
    }
}
