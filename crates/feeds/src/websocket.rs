//! WebSocket transport for exchange ticker streams.

use crate::{
    ExchangeAdapter, FeedConfig, FeedError, MarketDiscovery, StreamConnector, TickEvent,
    TickerStream,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects one exchange feed over WebSocket.
pub struct WsConnector {
    adapter: Arc<dyn ExchangeAdapter>,
    discovery: MarketDiscovery,
    config: FeedConfig,
}

impl WsConnector {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        discovery: MarketDiscovery,
        config: FeedConfig,
    ) -> Self {
        Self {
            adapter,
            discovery,
            config,
        }
    }

    async fn open(&self) -> Result<Box<dyn TickerStream>, FeedError> {
        let feed = self.adapter.feed();

        // Discovery first: a failed lookup should not hold a socket open.
        let subscribe_msgs = self.adapter.subscribe_messages(&self.discovery).await?;

        debug!("{}: Connecting to {}", feed, self.adapter.ws_url());
        let (ws_stream, response) = connect_async(self.adapter.ws_url()).await?;
        debug!("{}: Connected (status: {:?})", feed, response.status());

        let (mut write, read) = ws_stream.split();

        if !subscribe_msgs.is_empty() {
            debug!("{}: Sending {} subscription message(s)", feed, subscribe_msgs.len());
            for (i, msg) in subscribe_msgs.iter().enumerate() {
                write.send(Message::Text(msg.clone())).await.map_err(|e| {
                    FeedError::SubscriptionFailed(format!("{}: {}", feed, e))
                })?;
                if i + 1 < subscribe_msgs.len() {
                    tokio::time::sleep(self.config.subscribe_delay()).await;
                }
            }
        }

        let ping_timer = self.adapter.app_ping().map(|ping| {
            let mut timer = tokio::time::interval_at(Instant::now() + ping.interval, ping.interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer
        });

        Ok(Box::new(WsTickerStream {
            adapter: self.adapter.clone(),
            write,
            read,
            ping_timer,
            stale_timeout: self.config.stale_timeout(),
            last_message: Instant::now(),
            log_every: self.config.log_every.max(1),
            message_count: 0,
            dropped_count: 0,
        }))
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn TickerStream>, FeedError> {
        let timeout = self.config.connect_timeout();
        tokio::time::timeout(timeout, self.open())
            .await
            .map_err(|_| {
                FeedError::Timeout(format!("{}: connect took over {:?}", self.adapter.feed(), timeout))
            })?
    }
}

/// Live WebSocket subscription for one feed.
pub struct WsTickerStream {
    adapter: Arc<dyn ExchangeAdapter>,
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    ping_timer: Option<Interval>,
    stale_timeout: std::time::Duration,
    last_message: Instant,
    log_every: u64,
    message_count: u64,
    dropped_count: u64,
}

impl WsTickerStream {
    fn handle_text(&mut self, text: &str) -> Vec<TickEvent> {
        self.message_count += 1;
        if self.message_count % self.log_every == 0 {
            debug!(
                "{}: {} messages received, {} dropped",
                self.adapter.feed(),
                self.message_count,
                self.dropped_count
            );
        }

        match self.adapter.parse_message(text) {
            Ok(events) => events,
            Err(FeedError::SubscriptionFailed(reason)) => {
                warn!("{}: Subscription rejected: {}", self.adapter.feed(), reason);
                Vec::new()
            }
            Err(e) => {
                self.dropped_count += 1;
                debug!("{}: Dropping unparsable message: {}", self.adapter.feed(), e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl TickerStream for WsTickerStream {
    async fn next_events(&mut self) -> Result<Vec<TickEvent>, FeedError> {
        loop {
            let stale_at = self.last_message + self.stale_timeout;
            let ping_timer = &mut self.ping_timer;
            let app_ping = async {
                match ping_timer {
                    Some(timer) => {
                        timer.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                msg = self.read.next() => {
                    self.last_message = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let events = self.handle_text(&text);
                            if !events.is_empty() {
                                return Ok(events);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!("{}: Received close frame: {:?}", self.adapter.feed(), frame);
                            return Err(FeedError::Disconnected("Close frame received".to_string()));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(FeedError::Disconnected("Stream ended".to_string()));
                        }
                    }
                }
                _ = app_ping => {
                    if let Some(ping) = self.adapter.ping_message() {
                        self.write.send(Message::Text(ping)).await?;
                    }
                }
                _ = tokio::time::sleep_until(stale_at) => {
                    warn!(
                        "{}: No messages received for {:?}, forcing reconnect",
                        self.adapter.feed(),
                        self.stale_timeout
                    );
                    return Err(FeedError::Timeout(
                        "Stale connection - no messages received".to_string(),
                    ));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.write.send(Message::Close(None)).await {
            debug!("{}: Close frame not sent: {}", self.adapter.feed(), e);
        }
        let _ = self.write.close().await;
    }
}
