//! Deviation alerts.
//!
//! This crate provides:
//! - Mute registry with lazy expiry
//! - Threshold/mute alert evaluation
//! - Runtime settings and their JSON persistence
//! - Telegram message rendering and delivery

pub mod clock;
pub mod evaluator;
pub mod mute;
pub mod notifier;
pub mod settings;
pub mod store;
pub mod telegram;

pub use clock::{Clock, ManualClock, SystemClock};
pub use evaluator::{Alert, AlertEvaluator};
pub use mute::{MuteError, MuteRegistry, MutedCoin};
pub use notifier::{BroadcastReport, Notifier};
pub use settings::{Settings, SettingsError, MIN_CHECK_INTERVAL_SECS};
pub use store::{JsonFileStore, MuteStore, MuteTable, SettingsStore, StoreError};
pub use telegram::{
    format_alert_message, format_deviation_report, format_mute_list, format_status, AlertSender,
    SendError, TelegramSender, ALERT_MESSAGE_LIMIT, REPORT_PER_EXCHANGE_LIMIT,
};
