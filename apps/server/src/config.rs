//! Application configuration.

use basis_feeds::FeedConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Bot token variable read at startup.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
/// Comma-separated chat ids registered at startup.
pub const CHAT_IDS_ENV: &str = "TELEGRAM_CHAT_IDS";

/// Process-level configuration, resolved once from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding `settings.json` and `muted_coins.json`.
    pub data_dir: PathBuf,
    /// Telegram bot token. Without one, alerts are only logged.
    pub bot_token: Option<String>,
    /// Recipients to register in addition to the persisted ones.
    pub chat_ids: Vec<i64>,
    /// Upper bound on feed shutdown.
    pub shutdown_grace: Duration,
    pub feed: FeedConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            bot_token: None,
            chat_ids: Vec::new(),
            shutdown_grace: Duration::from_secs(5),
            feed: FeedConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read the bot token and chat ids from the environment.
    pub fn with_env(mut self) -> Self {
        self.bot_token = std::env::var(BOT_TOKEN_ENV)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Ok(raw) = std::env::var(CHAT_IDS_ENV) {
            self.chat_ids.extend(parse_chat_ids(&raw));
        }
        self
    }
}

/// Parse "123,-456, 789". Entries that are not integers are skipped.
pub fn parse_chat_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!("Ignoring invalid chat id {:?}", s);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.bot_token.is_none());
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.feed.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_chat_ids() {
        assert_eq!(parse_chat_ids("123, -456,,789"), vec![123, -456, 789]);
        assert_eq!(parse_chat_ids("12,abc"), vec![12]);
        assert!(parse_chat_ids("").is_empty());
    }
}
