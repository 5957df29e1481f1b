//! Price feed: one streaming subscription per (exchange, kind).

use crate::{FeedConfig, FeedError, FeedState, PriceCache, StreamConnector, TickEvent, TickerStream};
use basis_core::{normalize, FeedId, FundingInfo, MarketKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on a graceful close before the connection is simply dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Price feed that connects to an exchange and updates the cache.
pub struct PriceFeed {
    feed: FeedId,
    connector: Arc<dyn StreamConnector>,
    cache: Arc<PriceCache>,
    config: FeedConfig,
    state: Arc<watch::Sender<FeedState>>,
}

impl PriceFeed {
    /// Create a new price feed.
    pub fn new(
        feed: FeedId,
        connector: Arc<dyn StreamConnector>,
        cache: Arc<PriceCache>,
        config: FeedConfig,
    ) -> Self {
        let (state, _) = watch::channel(FeedState::Disconnected);
        Self::with_state(feed, connector, cache, config, Arc::new(state))
    }

    /// Create a feed that publishes into an existing state channel, so
    /// observers survive a restart. The channel's current state is kept.
    pub fn with_state(
        feed: FeedId,
        connector: Arc<dyn StreamConnector>,
        cache: Arc<PriceCache>,
        config: FeedConfig,
        state: Arc<watch::Sender<FeedState>>,
    ) -> Self {
        Self {
            feed,
            connector,
            cache,
            config,
            state,
        }
    }

    pub fn feed(&self) -> FeedId {
        self.feed
    }

    /// Observe state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    fn set_state(&self, next: FeedState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug_assert!(
                prev.can_transition_to(next),
                "invalid feed state transition {} -> {}",
                prev,
                next
            );
            debug!("{}: {} -> {}", self.feed, prev, next);
        }
    }

    /// Run until cancelled or until a permanent error.
    ///
    /// Transient errors back off for the configured delay and reconnect,
    /// without limit.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            self.set_state(FeedState::Connecting);

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            let err = match connected {
                Ok(mut stream) => {
                    info!("{}: Streaming", self.feed);
                    self.set_state(FeedState::Streaming);
                    let outcome = self.stream(stream.as_mut(), &cancel).await;
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, stream.close()).await;
                    match outcome {
                        Some(err) => err,
                        None => break,
                    }
                }
                Err(err) => err,
            };

            if err.is_permanent() {
                error!("{}: Feed stopped permanently: {}", self.feed, err);
                break;
            }

            warn!(
                "{}: {}. Reconnecting in {:?}",
                self.feed,
                err,
                self.config.reconnect_delay()
            );
            self.set_state(FeedState::Backoff);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }
        }

        self.set_state(FeedState::Stopped);
        debug!("{}: Feed task finished", self.feed);
    }

    /// Pump events into the cache. Returns `None` when cancelled.
    async fn stream(
        &self,
        stream: &mut dyn TickerStream,
        cancel: &CancellationToken,
    ) -> Option<FeedError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                result = stream.next_events() => match result {
                    Ok(events) => self.apply(events),
                    Err(err) => return Some(err),
                }
            }
        }
    }

    /// Write USDT-quoted, normalizable events into the cache.
    fn apply(&self, events: Vec<TickEvent>) {
        let FeedId { exchange, kind } = self.feed;

        for event in events {
            if !event.is_usdt() {
                continue;
            }
            let Some(coin) = normalize(event.base()) else {
                continue;
            };

            match event {
                TickEvent::Price { price, .. } => {
                    if price > 0.0 {
                        self.cache.set(exchange, kind, coin, price);
                    }
                }
                TickEvent::Funding {
                    rate,
                    next_funding_ms,
                    ..
                } => {
                    if kind == MarketKind::Futures {
                        self.cache
                            .set_funding(exchange, coin, FundingInfo::new(rate, next_funding_ms));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::mock::{ConnectStep, MockConnector, MockStream};
    use basis_core::{Exchange, MarketKind};
    use pretty_assertions::assert_eq;

    fn fast_config() -> FeedConfig {
        FeedConfig {
            reconnect_delay_ms: 10,
            ..Default::default()
        }
    }

    async fn wait_for_state(rx: &mut watch::Receiver<FeedState>, want: FeedState) {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn spawn_feed(
        feed: FeedId,
        connector: Arc<MockConnector>,
        cache: Arc<PriceCache>,
        config: FeedConfig,
    ) -> (
        watch::Receiver<FeedState>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let price_feed = PriceFeed::new(feed, connector, cache, config);
        let rx = price_feed.subscribe_state();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(price_feed.run(cancel.clone()));
        (rx, cancel, handle)
    }

    #[tokio::test]
    async fn test_streaming_writes_normalized_usdt_prices() {
        let feed = FeedId::new(Exchange::Bybit, MarketKind::Futures);
        let cache = Arc::new(PriceCache::new());
        let batch = vec![
            TickEvent::price("1000PEPE", "USDT", 0.011),
            TickEvent::price("ETHUP", "USDT", 3.0),
            TickEvent::price("BTC", "USDC", 50000.0),
            TickEvent::price("SOL", "USDT", 0.0),
            TickEvent::funding("BTC", "USDT", 0.0001, Some(1_700_000_000_000)),
        ];
        let connector = Arc::new(MockConnector::new(vec![ConnectStep::Stream(
            MockStream::new(vec![Ok(batch)]),
        )]));

        let (mut rx, cancel, handle) = spawn_feed(feed, connector, cache.clone(), fast_config());
        wait_for_state(&mut rx, FeedState::Streaming).await;
        wait_until(|| !cache.funding(Exchange::Bybit).is_empty()).await;

        let prices = cache.get(Exchange::Bybit, MarketKind::Futures);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices.get("PEPE"), Some(&0.011));
        assert_eq!(
            cache.funding(Exchange::Bybit).get("BTC"),
            Some(&FundingInfo::new(0.0001, Some(1_700_000_000_000)))
        );

        cancel.cancel();
        wait_for_state(&mut rx, FeedState::Stopped).await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_spot_feed_ignores_funding() {
        let feed = FeedId::new(Exchange::GateIO, MarketKind::Spot);
        let cache = Arc::new(PriceCache::new());
        let batch = vec![
            TickEvent::funding("BTC", "USDT", 0.0001, None),
            TickEvent::price("BTC", "USDT", 50000.0),
        ];
        let connector = Arc::new(MockConnector::new(vec![ConnectStep::Stream(
            MockStream::new(vec![Ok(batch)]),
        )]));

        let (_rx, cancel, handle) = spawn_feed(feed, connector, cache.clone(), fast_config());
        wait_until(|| cache.len(Exchange::GateIO, MarketKind::Spot) == 1).await;
        assert!(cache.funding(Exchange::GateIO).is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_errors_retry_until_streaming() {
        let feed = FeedId::new(Exchange::Binance, MarketKind::Spot);
        let cache = Arc::new(PriceCache::new());
        let connector = Arc::new(MockConnector::new(vec![
            ConnectStep::Fail(FeedError::ConnectionFailed("refused".into())),
            ConnectStep::Fail(FeedError::Timeout("handshake".into())),
            ConnectStep::Fail(FeedError::Discovery("HTTP 502".into())),
            ConnectStep::Stream(MockStream::new(vec![Ok(vec![TickEvent::price(
                "BTC", "USDT", 42000.0,
            )])])),
        ]));

        let (mut rx, cancel, handle) =
            spawn_feed(feed, connector.clone(), cache.clone(), fast_config());
        wait_for_state(&mut rx, FeedState::Streaming).await;
        assert_eq!(connector.connects(), 4);
        wait_until(|| cache.get_price(Exchange::Binance, MarketKind::Spot, "BTC").is_some()).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_error_reconnects() {
        let feed = FeedId::new(Exchange::Bybit, MarketKind::Spot);
        let cache = Arc::new(PriceCache::new());
        let connector = Arc::new(MockConnector::new(vec![
            ConnectStep::Stream(MockStream::new(vec![
                Ok(vec![TickEvent::price("ETH", "USDT", 3000.0)]),
                Err(FeedError::Timeout("stale".into())),
            ])),
            ConnectStep::Stream(MockStream::new(vec![Ok(vec![TickEvent::price(
                "ETH", "USDT", 3001.0,
            )])])),
        ]));

        let (_rx, cancel, handle) =
            spawn_feed(feed, connector.clone(), cache.clone(), fast_config());
        wait_until(|| cache.get_price(Exchange::Bybit, MarketKind::Spot, "ETH") == Some(3001.0))
            .await;
        assert_eq!(connector.connects(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_access_denied_stops_only_this_feed() {
        let cache = Arc::new(PriceCache::new());
        let blocked = Arc::new(MockConnector::new(vec![ConnectStep::Fail(
            FeedError::AccessDenied {
                status: 451,
                reason: "Unavailable For Legal Reasons".into(),
            },
        )]));
        let healthy = Arc::new(MockConnector::new(vec![ConnectStep::Stream(
            MockStream::new(vec![Ok(vec![TickEvent::price("BTC", "USDT", 1.0)])]),
        )]));

        let (mut blocked_rx, _blocked_cancel, blocked_handle) = spawn_feed(
            FeedId::new(Exchange::Binance, MarketKind::Spot),
            blocked.clone(),
            cache.clone(),
            fast_config(),
        );
        let (mut healthy_rx, healthy_cancel, healthy_handle) = spawn_feed(
            FeedId::new(Exchange::Bybit, MarketKind::Spot),
            healthy,
            cache.clone(),
            fast_config(),
        );

        wait_for_state(&mut blocked_rx, FeedState::Stopped).await;
        tokio::time::timeout(Duration::from_secs(2), blocked_handle)
            .await
            .expect("blocked feed did not finish")
            .unwrap();

        // No retry after a permanent error
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(blocked.connects(), 1);

        wait_for_state(&mut healthy_rx, FeedState::Streaming).await;
        healthy_cancel.cancel();
        healthy_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let feed = FeedId::new(Exchange::GateIO, MarketKind::Futures);
        let cache = Arc::new(PriceCache::new());
        let connector = Arc::new(MockConnector::new(vec![ConnectStep::Fail(
            FeedError::Disconnected("reset".into()),
        )]));
        let config = FeedConfig {
            reconnect_delay_ms: 60_000,
            ..Default::default()
        };

        let (mut rx, cancel, handle) = spawn_feed(feed, connector, cache, config);
        wait_for_state(&mut rx, FeedState::Backoff).await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancel did not interrupt backoff")
            .unwrap();
        assert_eq!(*rx.borrow(), FeedState::Stopped);
    }

    #[test]
    fn test_apply_writes_normalized_entries() {
        let cache = Arc::new(PriceCache::new());
        let connector = Arc::new(MockConnector::new(Vec::new()));
        let feed = PriceFeed::new(
            FeedId::new(Exchange::Binance, MarketKind::Futures),
            connector,
            cache.clone(),
            FeedConfig::default(),
        );

        feed.apply(vec![
            TickEvent::price("10000SATS", "USDT", 0.0003),
            TickEvent::price("BTCDOWN", "USDT", 0.1),
            TickEvent::funding("ETH", "USDT", -0.0002, None),
        ]);
        assert_eq!(cache.len(Exchange::Binance, MarketKind::Futures), 1);
        assert_eq!(
            cache.get_price(Exchange::Binance, MarketKind::Futures, "SATS"),
            Some(0.0003)
        );
        assert!(cache.funding(Exchange::Binance).get("ETH").is_some());
        assert_eq!(feed.state(), FeedState::Disconnected);
    }

    #[test]
    fn test_restarted_feed_keeps_published_state() {
        let (state, _) = watch::channel(FeedState::Backoff);
        let feed = PriceFeed::with_state(
            FeedId::new(Exchange::Bybit, MarketKind::Spot),
            Arc::new(MockConnector::new(Vec::new())),
            Arc::new(PriceCache::new()),
            FeedConfig::default(),
            Arc::new(state),
        );
        assert_eq!(feed.state(), FeedState::Backoff);

        feed.set_state(FeedState::Connecting);
        assert_eq!(feed.state(), FeedState::Connecting);
    }

    #[test]
    #[should_panic(expected = "invalid feed state transition")]
    fn test_stopped_feed_cannot_reconnect() {
        let (state, _) = watch::channel(FeedState::Stopped);
        let feed = PriceFeed::with_state(
            FeedId::new(Exchange::Bybit, MarketKind::Spot),
            Arc::new(MockConnector::new(Vec::new())),
            Arc::new(PriceCache::new()),
            FeedConfig::default(),
            Arc::new(state),
        );
        feed.set_state(FeedState::Connecting);
    }
}
