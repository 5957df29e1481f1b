//! Tick events produced by exchange adapters.
//!
//! Adapters split the exchange-native instrument name into base and quote
//! but leave the base un-normalized; the feed decides what to keep.

/// One update parsed from an exchange message.
#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    /// Last traded price for an instrument.
    Price {
        base: String,
        quote: String,
        price: f64,
    },
    /// Funding rate (fraction) and next funding instant of a perpetual.
    Funding {
        base: String,
        quote: String,
        rate: f64,
        next_funding_ms: Option<u64>,
    },
}

impl TickEvent {
    pub fn price(base: impl Into<String>, quote: impl Into<String>, price: f64) -> Self {
        TickEvent::Price {
            base: base.into(),
            quote: quote.into(),
            price,
        }
    }

    pub fn funding(
        base: impl Into<String>,
        quote: impl Into<String>,
        rate: f64,
        next_funding_ms: Option<u64>,
    ) -> Self {
        TickEvent::Funding {
            base: base.into(),
            quote: quote.into(),
            rate,
            next_funding_ms,
        }
    }

    pub fn base(&self) -> &str {
        match self {
            TickEvent::Price { base, .. } | TickEvent::Funding { base, .. } => base,
        }
    }

    pub fn quote(&self) -> &str {
        match self {
            TickEvent::Price { quote, .. } | TickEvent::Funding { quote, .. } => quote,
        }
    }

    /// Only USDT-quoted instruments are compared.
    #[inline]
    pub fn is_usdt(&self) -> bool {
        self.quote() == "USDT"
    }
}

/// Parse a decimal string field, treating empty strings as absent.
pub(crate) fn parse_decimal(value: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}
