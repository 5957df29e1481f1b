//! Feed supervisor: owns the full set of price feeds.

use crate::{
    adapter_for, FeedConfig, FeedState, MarketDiscovery, PriceCache, PriceFeed, StreamConnector,
    WsConnector,
};
use basis_core::{EnabledExchanges, FeedId};
use futures_util::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Builds the connector for one feed.
pub type ConnectorFactory = Arc<dyn Fn(FeedId) -> Arc<dyn StreamConnector> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("Supervisor already stopped")]
    Stopped,
}

struct FeedSlot {
    state: Arc<watch::Sender<FeedState>>,
    restarts: Arc<AtomicU32>,
    task: Option<JoinHandle<()>>,
}

/// Starts, restarts and stops one [`PriceFeed`] per enabled (exchange, kind).
pub struct FeedSupervisor {
    cache: Arc<PriceCache>,
    enabled: EnabledExchanges,
    config: FeedConfig,
    grace: Duration,
    connector_for: ConnectorFactory,
    cancel: CancellationToken,
    stopped: AtomicBool,
    feeds: Mutex<BTreeMap<FeedId, FeedSlot>>,
}

impl FeedSupervisor {
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

    pub fn new(
        cache: Arc<PriceCache>,
        enabled: EnabledExchanges,
        config: FeedConfig,
        connector_for: ConnectorFactory,
    ) -> Self {
        Self {
            cache,
            enabled,
            config,
            grace: Self::DEFAULT_GRACE,
            connector_for,
            cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            feeds: Mutex::new(BTreeMap::new()),
        }
    }

    /// Supervisor wired to the live exchange WebSocket endpoints.
    pub fn websocket(cache: Arc<PriceCache>, enabled: EnabledExchanges, config: FeedConfig) -> Self {
        let discovery = MarketDiscovery::new();
        let ws_config = config.clone();
        let connector_for: ConnectorFactory = Arc::new(move |feed| {
            Arc::new(WsConnector::new(
                adapter_for(feed),
                discovery.clone(),
                ws_config.clone(),
            )) as Arc<dyn StreamConnector>
        });
        Self::new(cache, enabled, config, connector_for)
    }

    /// Bound on how long `stop()` waits before aborting feed tasks.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn feeds(&self) -> MutexGuard<'_, BTreeMap<FeedId, FeedSlot>> {
        self.feeds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launch every enabled feed that is not already running.
    /// Returns the number of feeds launched by this call.
    pub fn start(&self) -> Result<usize, SupervisorError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SupervisorError::Stopped);
        }

        let mut feeds = self.feeds();
        let mut launched = 0;

        for feed in self.enabled.feeds() {
            if feeds.contains_key(&feed) {
                continue;
            }

            let (state, _) = watch::channel(FeedState::Disconnected);
            let state = Arc::new(state);
            let restarts = Arc::new(AtomicU32::new(0));
            let task = tokio::spawn(supervise(
                feed,
                (self.connector_for)(feed),
                self.cache.clone(),
                self.config.clone(),
                state.clone(),
                restarts.clone(),
                self.cancel.clone(),
            ));

            feeds.insert(
                feed,
                FeedSlot {
                    state,
                    restarts,
                    task: Some(task),
                },
            );
            launched += 1;
        }

        if launched > 0 {
            info!("Started {} feeds", launched);
        }
        Ok(launched)
    }

    /// Signal every feed to stop, then wait up to the grace period for all of
    /// them together. Feeds still running after that are aborted.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let tasks: Vec<(FeedId, Arc<watch::Sender<FeedState>>, JoinHandle<()>)> = self
            .feeds()
            .iter_mut()
            .filter_map(|(feed, slot)| slot.task.take().map(|t| (*feed, slot.state.clone(), t)))
            .collect();

        let deadline = tokio::time::Instant::now() + self.grace;
        for (feed, state, mut task) in tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                warn!("{}: Feed did not stop within {:?}, aborting", feed, self.grace);
                task.abort();
                state.send_replace(FeedState::Stopped);
            }
        }

        info!("All feeds stopped");
    }

    /// Current state of every launched feed, in (exchange, kind) order.
    pub fn states(&self) -> Vec<(FeedId, FeedState)> {
        self.feeds()
            .iter()
            .map(|(feed, slot)| (*feed, *slot.state.borrow()))
            .collect()
    }

    /// Watch one feed's state.
    pub fn subscribe(&self, feed: FeedId) -> Option<watch::Receiver<FeedState>> {
        self.feeds().get(&feed).map(|slot| slot.state.subscribe())
    }

    /// How many times a feed was restarted after a panic.
    pub fn restarts(&self, feed: FeedId) -> u32 {
        self.feeds()
            .get(&feed)
            .map(|slot| slot.restarts.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

/// Run one feed, restarting it in place if it panics.
async fn supervise(
    feed: FeedId,
    connector: Arc<dyn StreamConnector>,
    cache: Arc<PriceCache>,
    config: FeedConfig,
    state: Arc<watch::Sender<FeedState>>,
    restarts: Arc<AtomicU32>,
    cancel: CancellationToken,
) {
    loop {
        let price_feed = PriceFeed::with_state(
            feed,
            connector.clone(),
            cache.clone(),
            config.clone(),
            state.clone(),
        );

        match AssertUnwindSafe(price_feed.run(cancel.clone()))
            .catch_unwind()
            .await
        {
            Ok(()) => break,
            Err(panic) => {
                restarts.fetch_add(1, Ordering::SeqCst);
                error!(
                    "{}: Feed task panicked: {}. Restarting in {:?}",
                    feed,
                    panic_message(panic.as_ref()),
                    config.reconnect_delay()
                );
                state.send_replace(FeedState::Backoff);

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.reconnect_delay()) => {}
                }
            }
        }
    }

    state.send_replace(FeedState::Stopped);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
