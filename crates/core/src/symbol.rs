//! Canonical coin identifiers.
//!
//! Exchanges list the same asset under different tickers: Binance and Bybit
//! quote low-priced perpetuals in lots of 1000 or 10000 ("1000PEPE",
//! "10000SATS") while the spot market uses the bare ticker. Normalizing both
//! sides to one identifier is what lets spot and futures caches be joined.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Multiplier prefixes, longest first so "10000X" never matches as "1000" + "0X".
const MULTIPLIER_PREFIXES: &[&str] = &["10000", "1000"];

/// Markers of leveraged tokens (BTCUP, ETHDOWN, ...).
const LEVERAGED_MARKERS: &[&str] = &["UP", "DOWN"];

/// Uppercase coin identifier with multiplier prefixes stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalCoin(CompactString);

impl CanonicalCoin {
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for CanonicalCoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Borrow<str> for CanonicalCoin {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for CanonicalCoin {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Map an exchange-native base ticker to its canonical coin.
///
/// Returns `None` for leveraged-token variants (anything containing "UP" or
/// "DOWN" after prefix stripping) and for tickers that are empty once the
/// prefix is removed.
pub fn normalize(raw: &str) -> Option<CanonicalCoin> {
    let upper = raw.to_uppercase();

    let stripped = MULTIPLIER_PREFIXES
        .iter()
        .find_map(|prefix| upper.strip_prefix(prefix))
        .unwrap_or(&upper);

    if stripped.is_empty() {
        return None;
    }
    if LEVERAGED_MARKERS.iter().any(|m| stripped.contains(m)) {
        return None;
    }

    Some(CanonicalCoin(CompactString::new(stripped)))
}
