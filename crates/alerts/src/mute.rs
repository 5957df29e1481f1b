//! Time-bounded coin mutes.
//!
//! Expired entries are removed lazily, by whichever read finds them first.
//! There is no background sweep.

use crate::{Clock, MuteStore, MuteTable};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MuteError {
    #[error("Mute duration must be a positive number of hours, got {0:?}")]
    InvalidDuration(String),
    #[error("Coin name is empty")]
    EmptyCoin,
}

/// One active mute as shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutedCoin {
    pub coin: String,
    pub expires_at: DateTime<Utc>,
    /// Whole hours remaining
    pub hours: i64,
    /// Whole minutes remaining past `hours`
    pub minutes: i64,
}

/// Coin -> mute expiry.
pub struct MuteRegistry {
    entries: DashMap<String, DateTime<Utc>>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn MuteStore>>,
    /// Held from snapshot to save so the newest table is written last.
    save_lock: Mutex<()>,
}

impl MuteRegistry {
    /// In-memory registry.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            store: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Registry backed by a store: loads the saved table now and saves after
    /// every change. A failed load starts empty.
    pub fn with_store(clock: Arc<dyn Clock>, store: Arc<dyn MuteStore>) -> Self {
        let entries = match store.load_mutes() {
            Ok(table) => table.into_iter().collect(),
            Err(e) => {
                warn!("Failed to load muted coins, starting empty: {}", e);
                DashMap::new()
            }
        };
        Self {
            entries,
            clock,
            store: Some(store),
            save_lock: Mutex::new(()),
        }
    }

    fn key(coin: &str) -> String {
        coin.trim().to_uppercase()
    }

    /// Mute `coin` for `hours`, replacing any existing mute.
    pub fn mute(&self, coin: &str, hours: f64) -> Result<DateTime<Utc>, MuteError> {
        let key = Self::key(coin);
        if key.is_empty() {
            return Err(MuteError::EmptyCoin);
        }
        if !(hours.is_finite() && hours > 0.0) {
            return Err(MuteError::InvalidDuration(hours.to_string()));
        }

        let millis = (hours * 3_600_000.0).round() as i64;
        let expires_at = Duration::try_milliseconds(millis)
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .ok_or_else(|| MuteError::InvalidDuration(hours.to_string()))?;

        self.entries.insert(key.clone(), expires_at);
        debug!("Muted {} until {}", key, expires_at);
        self.persist();
        Ok(expires_at)
    }

    /// Parse a user-supplied hour count, then mute.
    pub fn mute_str(&self, coin: &str, hours: &str) -> Result<DateTime<Utc>, MuteError> {
        let parsed = hours
            .trim()
            .parse::<f64>()
            .map_err(|_| MuteError::InvalidDuration(hours.to_string()))?;
        self.mute(coin, parsed)
            .map_err(|e| match e {
                MuteError::InvalidDuration(_) => MuteError::InvalidDuration(hours.to_string()),
                other => other,
            })
    }

    /// True while an unexpired entry exists. An expired entry is deleted.
    pub fn is_muted(&self, coin: &str) -> bool {
        let key = Self::key(coin);
        let now = self.clock.now();

        if self
            .entries
            .remove_if(&key, |_, expires_at| *expires_at <= now)
            .is_some()
        {
            debug!("Mute on {} expired", key);
            self.persist();
            return false;
        }
        self.entries.contains_key(&key)
    }

    /// Remove a mute. Returns whether one existed.
    pub fn unmute(&self, coin: &str) -> bool {
        let removed = self.entries.remove(&Self::key(coin)).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    /// Active mutes ordered by coin. Prunes expired entries first.
    pub fn list(&self) -> Vec<MutedCoin> {
        let now = self.clock.now();
        if self.prune(now) > 0 {
            self.persist();
        }

        let mut muted: Vec<MutedCoin> = self
            .entries
            .iter()
            .map(|entry| {
                let total_minutes = (*entry.value() - now).num_minutes().max(0);
                MutedCoin {
                    coin: entry.key().clone(),
                    expires_at: *entry.value(),
                    hours: total_minutes / 60,
                    minutes: total_minutes % 60,
                }
            })
            .collect();
        muted.sort_by(|a, b| a.coin.cmp(&b.coin));
        muted
    }

    /// Number of entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let table: MuteTable = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        if let Err(e) = store.save_mutes(&table) {
            warn!("Failed to save muted coins: {}", e);
        }
    }
}
