//! Core data types for the spot/futures basis monitor.

pub mod deviation;
pub mod exchange;
pub mod symbol;

pub use deviation::*;
pub use exchange::*;
pub use symbol::*;
