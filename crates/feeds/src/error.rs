//! Error types for feed operations.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// How a feed should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// Back off and reconnect.
    Transient,
    /// Stop this feed for the lifetime of the process.
    Permanent,
}

/// Errors that can occur during feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket disconnected: {0}")]
    Disconnected(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Instrument discovery failed: {0}")]
    Discovery(String),

    #[error("Access denied (HTTP {status}): {reason}")]
    AccessDenied { status: u16, reason: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Channel closed")]
    ChannelClosed,
}

/// HTTP statuses on the WebSocket upgrade that mean the exchange refuses us
/// outright (451 is Binance's region block, Bybit's CDN answers 403).
const ACCESS_DENIED_STATUSES: &[u16] = &[403, 451];

impl From<tungstenite::Error> for FeedError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => {
                let status = response.status().as_u16();
                let reason = response
                    .status()
                    .canonical_reason()
                    .unwrap_or("unknown")
                    .to_string();
                if ACCESS_DENIED_STATUSES.contains(&status) {
                    FeedError::AccessDenied { status, reason }
                } else {
                    FeedError::ConnectionFailed(format!("HTTP {}: {}", status, reason))
                }
            }
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                FeedError::Disconnected(err.to_string())
            }
            other => FeedError::ConnectionFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Discovery(err.to_string())
    }
}

/// Body fragments of a REST 403 that mark a geographic block rather than a
/// rate-limit ban.
const REGION_BLOCK_HINTS: &[&str] = &["country", "region", "restricted location"];

impl FeedError {
    /// Classify a failed REST response. 451 always means a region block. A 403
    /// only does when the body says so, since exchanges also answer 403 to an
    /// IP that exceeded its rate limit.
    pub fn from_rest_status(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        let region_blocked =
            status == 451 || (status == 403 && REGION_BLOCK_HINTS.iter().any(|h| lower.contains(h)));
        let snippet: String = body.chars().take(200).collect();
        if region_blocked {
            FeedError::AccessDenied {
                status,
                reason: snippet,
            }
        } else {
            FeedError::Discovery(format!("HTTP {}: {}", status, snippet))
        }
    }

    /// Classification decided once, from the variant.
    pub fn kind(&self) -> FeedErrorKind {
        match self {
            FeedError::AccessDenied { .. } => FeedErrorKind::Permanent,
            FeedError::ConnectionFailed(_)
            | FeedError::Disconnected(_)
            | FeedError::ParseError(_)
            | FeedError::SubscriptionFailed(_)
            | FeedError::Discovery(_)
            | FeedError::Timeout(_)
            | FeedError::ChannelClosed => FeedErrorKind::Transient,
        }
    }

    /// Returns true if this error is transient and likely to succeed on retry.
    pub fn is_transient(&self) -> bool {
        self.kind() == FeedErrorKind::Transient
    }

    /// Returns true if the feed must not be retried.
    pub fn is_permanent(&self) -> bool {
        self.kind() == FeedErrorKind::Permanent
    }
}
