//! Telegram message rendering and delivery.

use crate::{Alert, MutedCoin, Settings};
use async_trait::async_trait;
use basis_core::{Deviation, Exchange};
use std::fmt::Write as _;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Alerts per periodic message.
pub const ALERT_MESSAGE_LIMIT: usize = 15;
/// Entries per exchange in the on-demand report.
pub const REPORT_PER_EXCHANGE_LIMIT: usize = 10;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Error, Debug)]
pub enum SendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Telegram API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Delivers one rendered message to one chat.
#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError>;
}

/// Bot API `sendMessage` over HTTPS, HTML parse mode.
pub struct TelegramSender {
    http_client: reqwest::Client,
    bot_token: String,
}

impl TelegramSender {
    pub fn new(bot_token: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http_client,
            bot_token: bot_token.into(),
        }
    }
}

#[async_trait]
impl AlertSender for TelegramSender {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        let url = format!("{}/bot{}/sendMessage", API_BASE, self.bot_token);
        let chat_id = chat_id.to_string();
        let params = [
            ("chat_id", chat_id.as_str()),
            ("text", text),
            ("parse_mode", "HTML"),
            ("disable_web_page_preview", "true"),
        ];

        let response = self.http_client.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Message delivered to chat {}", chat_id);
        Ok(())
    }
}

fn exchange_label(exchange: Exchange) -> String {
    exchange.key().to_uppercase()
}

/// Periodic alert message. Lists at most `limit` alerts.
pub fn format_alert_message(alerts: &[Alert], limit: usize) -> String {
    let mut msg = String::from("⚠️ <b>Deviation alert</b>\n");
    for alert in alerts.iter().take(limit) {
        let _ = write!(
            msg,
            "\n🚨 <b>{}</b> | {}: {}",
            exchange_label(alert.exchange),
            alert.deviation.coin,
            alert.deviation.signed_percent()
        );
    }
    if alerts.len() > limit {
        let _ = write!(msg, "\n\n… and {} more", alerts.len() - limit);
    }
    msg
}

/// On-demand report: the top entries of each exchange, marked red at or
/// above `threshold`.
pub fn format_deviation_report(
    all: &[(Exchange, Vec<Deviation>)],
    threshold: f64,
    per_exchange_limit: usize,
) -> String {
    if all.iter().all(|(_, deviations)| deviations.is_empty()) {
        return "❌ No data yet. Price streams may still be loading.".to_string();
    }

    let mut msg = format!(
        "📊 <b>Current deviations (top {})</b>\n",
        per_exchange_limit
    );
    for (exchange, deviations) in all {
        let _ = write!(msg, "\n<b>{}</b>:\n", exchange_label(*exchange));
        if deviations.is_empty() {
            msg.push_str("⚠️ No data\n");
            continue;
        }
        for d in deviations.iter().take(per_exchange_limit) {
            let marker = if d.abs_percent() >= threshold { "🔴" } else { "⚪" };
            let _ = writeln!(
                msg,
                "{} {}: {} (funding {:+.4}%, {})",
                marker,
                d.coin,
                d.signed_percent(),
                d.funding_rate_percent,
                d.time_to_next_funding
            );
        }
    }
    msg
}

pub fn format_mute_list(muted: &[MutedCoin]) -> String {
    if muted.is_empty() {
        return "🔕 <b>Muted coins</b>\n\nThe list is empty.\n\n\
                To mute a coin: <code>/mute COIN HOURS</code>\n\
                Example: <code>/mute BTC 2</code>"
            .to_string();
    }

    let mut msg = String::from("🔕 <b>Muted coins</b>\n\n");
    for m in muted {
        let _ = writeln!(msg, "• {}: {}h {}m", m.coin, m.hours, m.minutes);
    }
    msg
}

/// Bot status: per-exchange flag with the number of cached spot pairs.
pub fn format_status(settings: &Settings, spot_pairs: &[(Exchange, usize)], muted: usize) -> String {
    let enabled = settings.enabled_exchanges();
    let mut msg = String::from("📊 <b>Bot status</b>\n\n");
    for (exchange, pairs) in spot_pairs {
        let flag = if enabled.is_enabled(*exchange) { "✅" } else { "❌" };
        let _ = writeln!(msg, "{}: {} ({} pairs)", exchange, flag, pairs);
    }
    let _ = write!(
        msg,
        "Threshold: {}%\nInterval: {} s\nMuted coins: {}",
        settings.threshold_percent, settings.check_interval_seconds, muted
    );
    msg
}
