//! Capability interface between a price feed and its transport.

use crate::{FeedError, TickEvent};
use async_trait::async_trait;

/// An open subscription yielding tick events.
#[async_trait]
pub trait TickerStream: Send {
    /// Wait for the next non-empty batch of events.
    ///
    /// Any error ends the stream; the caller reconnects or stops depending
    /// on [`FeedError::kind`].
    async fn next_events(&mut self) -> Result<Vec<TickEvent>, FeedError>;

    /// Release the underlying connection.
    async fn close(&mut self);
}

/// Opens a fresh [`TickerStream`] for one feed.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn TickerStream>, FeedError>;
}
