//! Runtime alert settings.

use basis_core::{EnabledExchanges, Exchange};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Shortest allowed check interval.
pub const MIN_CHECK_INTERVAL_SECS: u64 = 30;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Threshold must be a positive number, got {0:?}")]
    InvalidThreshold(String),
    #[error("Check interval must be a whole number of seconds, at least {min}, got {value:?}")]
    InvalidInterval { value: String, min: u64 },
}

/// Alert settings persisted between runs.
///
/// Missing fields in a stored document fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Absolute deviation (percent) at which a coin alerts
    pub threshold_percent: f64,
    /// Seconds between periodic checks
    pub check_interval_seconds: u64,
    pub binance_enabled: bool,
    pub bybit_enabled: bool,
    pub gate_enabled: bool,
    /// Telegram chats that receive alerts
    pub chat_ids: Vec<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold_percent: 1.0,
            check_interval_seconds: 60,
            binance_enabled: true,
            bybit_enabled: true,
            gate_enabled: true,
            chat_ids: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse and apply a new threshold. State is unchanged on error.
    pub fn set_threshold(&mut self, text: &str) -> Result<f64, SettingsError> {
        let value = text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| SettingsError::InvalidThreshold(text.to_string()))?;
        self.threshold_percent = value;
        Ok(value)
    }

    /// Parse and apply a new check interval. State is unchanged on error.
    pub fn set_check_interval(&mut self, text: &str) -> Result<u64, SettingsError> {
        let value = text
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|v| *v >= MIN_CHECK_INTERVAL_SECS)
            .ok_or_else(|| SettingsError::InvalidInterval {
                value: text.to_string(),
                min: MIN_CHECK_INTERVAL_SECS,
            })?;
        self.check_interval_seconds = value;
        Ok(value)
    }

    pub fn enabled_exchanges(&self) -> EnabledExchanges {
        EnabledExchanges {
            binance: self.binance_enabled,
            bybit: self.bybit_enabled,
            gate: self.gate_enabled,
        }
    }

    pub fn set_exchange_enabled(&mut self, exchange: Exchange, enabled: bool) {
        match exchange {
            Exchange::Binance => self.binance_enabled = enabled,
            Exchange::Bybit => self.bybit_enabled = enabled,
            Exchange::GateIO => self.gate_enabled = enabled,
        }
    }

    /// Flip one exchange's flag and return the new value.
    pub fn toggle_exchange(&mut self, exchange: Exchange) -> bool {
        let enabled = !self.enabled_exchanges().is_enabled(exchange);
        self.set_exchange_enabled(exchange, enabled);
        enabled
    }

    /// Reset out-of-range fields of a loaded document to their defaults.
    /// Returns true if anything changed.
    pub fn sanitize(&mut self) -> bool {
        let defaults = Settings::default();
        let mut changed = false;
        if !(self.threshold_percent.is_finite() && self.threshold_percent > 0.0) {
            warn!(
                "Stored threshold {} is not positive, using {}",
                self.threshold_percent, defaults.threshold_percent
            );
            self.threshold_percent = defaults.threshold_percent;
            changed = true;
        }
        if self.check_interval_seconds < MIN_CHECK_INTERVAL_SECS {
            warn!(
                "Stored check interval {}s is below {}s, using {}s",
                self.check_interval_seconds,
                MIN_CHECK_INTERVAL_SECS,
                defaults.check_interval_seconds
            );
            self.check_interval_seconds = defaults.check_interval_seconds;
            changed = true;
        }
        changed
    }

    /// Add a recipient. Returns false if it was already registered.
    pub fn register_chat(&mut self, chat_id: i64) -> bool {
        if self.chat_ids.contains(&chat_id) {
            return false;
        }
        self.chat_ids.push(chat_id);
        true
    }
}
