//! Deviation engine.
//!
//! Turns the spot and futures price caches of an exchange into a ranked list
//! of spot/futures gaps.

pub mod deviation;

pub use deviation::*;
