//! Real-time spot and futures price feeds.
//!
//! One [`PriceFeed`] per (exchange, kind) keeps a WebSocket subscription open
//! and writes the latest USDT prices into the shared [`PriceCache`].
//!
//! ## Architecture
//!
//! - `adapter/` - Exchange-specific subscription and message parsing
//! - `stream` - Transport-agnostic `StreamConnector` / `TickerStream` traits
//! - `websocket` - tokio-tungstenite implementation of those traits
//! - `feed` - Per-feed state machine (connect, stream, back off, stop)
//! - `supervisor` - Launches, restarts and stops every feed

pub mod adapter;
pub mod cache;
pub mod discovery;
pub mod error;
pub mod feed;
pub mod manager;
pub mod message;
pub mod stream;
pub mod supervisor;
pub mod websocket;

pub use adapter::{adapter_for, AppPing, BinanceAdapter, BybitAdapter, ExchangeAdapter, GateIOAdapter};
pub use cache::*;
pub use discovery::*;
pub use error::*;
pub use feed::*;
pub use manager::*;
pub use message::TickEvent;
pub use stream::{StreamConnector, TickerStream};
pub use supervisor::*;
pub use websocket::*;
