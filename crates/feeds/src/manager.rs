//! Feed lifecycle state and tuning.

use std::time::Duration;

/// Connection state for a price feed.
///
/// `Disconnected -> Connecting -> Streaming -> (error) -> Backoff -> Connecting`.
/// `Stopped` is terminal and reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Streaming,
    Backoff,
    Stopped,
}

impl FeedState {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedState::Disconnected => "disconnected",
            FeedState::Connecting => "connecting",
            FeedState::Streaming => "streaming",
            FeedState::Backoff => "backoff",
            FeedState::Stopped => "stopped",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: FeedState) -> bool {
        use FeedState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Disconnected, Connecting)
            | (Connecting, Streaming)
            | (Connecting, Backoff)
            | (Streaming, Backoff)
            | (Backoff, Connecting) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration shared by every feed connection.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Fixed delay before reconnecting (ms)
    pub reconnect_delay_ms: u64,
    /// Reconnect when nothing arrives for this long (ms)
    pub stale_timeout_ms: u64,
    /// Connection timeout, covering discovery and the WebSocket handshake (ms)
    pub connect_timeout_ms: u64,
    /// Pause between consecutive subscribe messages (ms)
    pub subscribe_delay_ms: u64,
    /// Log a message counter every N frames
    pub log_every: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5_000,
            stale_timeout_ms: 120_000,
            connect_timeout_ms: 30_000,
            subscribe_delay_ms: 50,
            log_every: 10_000,
        }
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn subscribe_delay(&self) -> Duration {
        Duration::from_millis(self.subscribe_delay_ms)
    }
}
