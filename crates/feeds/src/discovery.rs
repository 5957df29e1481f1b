//! Market discovery module.
//!
//! Bybit and Gate.io have no "all tickers" WebSocket topic, so their feeds
//! fetch the list of tradable USDT instruments over REST before subscribing.

use crate::FeedError;
use basis_core::MarketKind;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

/// Market info as listed by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketInfo {
    /// Base asset (e.g., "BTC", "1000PEPE")
    pub base: String,
    /// Quote asset (e.g., "USDT")
    pub quote: String,
    /// Original symbol from exchange ("BTCUSDT", "BTC_USDT")
    pub symbol: String,
    /// Whether trading is enabled
    pub trading_enabled: bool,
}

impl MarketInfo {
    /// Tradable USDT market.
    pub fn is_active_usdt(&self) -> bool {
        self.trading_enabled && self.quote == "USDT"
    }
}

/// Market discovery client.
#[derive(Clone)]
pub struct MarketDiscovery {
    client: reqwest::Client,
}

impl Default for MarketDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDiscovery {
    const BYBIT_URL: &'static str = "https://api.bybit.com/v5/market/instruments-info";
    const GATEIO_URL: &'static str = "https://api.gateio.ws/api/v4";

    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Send a GET and decode its JSON body. A failed status is classified
    /// from the response body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, FeedError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::from_rest_status(status.as_u16(), &body));
        }
        Ok(response.json().await?)
    }

    /// Fetch Bybit instruments (`spot` or `linear`), following pagination.
    pub async fn fetch_bybit(&self, kind: MarketKind) -> Result<Vec<MarketInfo>, FeedError> {
        #[derive(Debug, Deserialize)]
        struct BybitResponse {
            #[serde(rename = "retCode")]
            ret_code: i64,
            #[serde(rename = "retMsg", default)]
            ret_msg: String,
            result: Option<BybitResult>,
        }

        #[derive(Debug, Deserialize)]
        struct BybitResult {
            #[serde(default)]
            list: Vec<BybitSymbol>,
            #[serde(rename = "nextPageCursor", default)]
            next_page_cursor: String,
        }

        #[derive(Debug, Deserialize)]
        struct BybitSymbol {
            symbol: String,
            #[serde(rename = "baseCoin")]
            base_coin: String,
            #[serde(rename = "quoteCoin")]
            quote_coin: String,
            status: String,
            #[serde(rename = "contractType", default)]
            contract_type: String,
        }

        let category = match kind {
            MarketKind::Spot => "spot",
            MarketKind::Futures => "linear",
        };

        let mut markets = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut request = self
                .client
                .get(Self::BYBIT_URL)
                .query(&[("category", category), ("limit", "1000")]);
            if !cursor.is_empty() {
                request = request.query(&[("cursor", cursor.as_str())]);
            }

            let resp: BybitResponse = self.get_json(request).await?;
            if resp.ret_code != 0 {
                return Err(FeedError::Discovery(format!(
                    "Bybit instruments-info retCode {}: {}",
                    resp.ret_code, resp.ret_msg
                )));
            }
            let Some(result) = resp.result else {
                break;
            };

            markets.extend(
                result
                    .list
                    .into_iter()
                    // Dated futures share the linear category
                    .filter(|s| s.contract_type.is_empty() || s.contract_type == "LinearPerpetual")
                    .map(|s| MarketInfo {
                        base: s.base_coin,
                        quote: s.quote_coin,
                        symbol: s.symbol,
                        trading_enabled: s.status == "Trading",
                    }),
            );

            if result.next_page_cursor.is_empty() {
                break;
            }
            cursor = result.next_page_cursor;
        }

        debug!("Bybit {}: fetched {} markets", category, markets.len());
        Ok(markets)
    }

    /// Fetch Gate.io spot pairs or USDT-settled perpetual contracts.
    pub async fn fetch_gateio(&self, kind: MarketKind) -> Result<Vec<MarketInfo>, FeedError> {
        #[derive(Debug, Deserialize)]
        struct GateSpotPair {
            id: String,
            base: String,
            quote: String,
            trade_status: String,
        }

        #[derive(Debug, Deserialize)]
        struct GateContract {
            name: String,
            #[serde(default)]
            in_delisting: bool,
        }

        let markets: Vec<MarketInfo> = match kind {
            MarketKind::Spot => {
                let url = format!("{}/spot/currency_pairs", Self::GATEIO_URL);
                let pairs: Vec<GateSpotPair> = self.get_json(self.client.get(url)).await?;
                pairs
                    .into_iter()
                    .map(|p| MarketInfo {
                        base: p.base,
                        quote: p.quote,
                        symbol: p.id,
                        trading_enabled: p.trade_status == "tradable",
                    })
                    .collect()
            }
            MarketKind::Futures => {
                let url = format!("{}/futures/usdt/contracts", Self::GATEIO_URL);
                let contracts: Vec<GateContract> = self.get_json(self.client.get(url)).await?;
                contracts
                    .into_iter()
                    .filter_map(|c| {
                        let (base, quote) = c.name.split_once('_')?;
                        Some(MarketInfo {
                            base: base.to_string(),
                            quote: quote.to_string(),
                            symbol: c.name.clone(),
                            trading_enabled: !c.in_delisting,
                        })
                    })
                    .collect()
            }
        };

        debug!("Gate.io {}: fetched {} markets", kind, markets.len());
        Ok(markets)
    }
}

/// Exchange symbols of the tradable USDT markets.
pub fn active_usdt_symbols(markets: &[MarketInfo]) -> Vec<String> {
    markets
        .iter()
        .filter(|m| m.is_active_usdt())
        .map(|m| m.symbol.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(symbol: &str, quote: &str, enabled: bool) -> MarketInfo {
        MarketInfo {
            base: symbol.trim_end_matches(quote).to_string(),
            quote: quote.to_string(),
            symbol: symbol.to_string(),
            trading_enabled: enabled,
        }
    }

    #[test]
    fn test_active_usdt_symbols() {
        let markets = vec![
            market("BTCUSDT", "USDT", true),
            market("ETHUSDC", "USDC", true),
            market("LUNAUSDT", "USDT", false),
            market("SOLUSDT", "USDT", true),
        ];
        assert_eq!(active_usdt_symbols(&markets), vec!["BTCUSDT", "SOLUSDT"]);
    }
}
