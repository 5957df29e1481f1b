//! Periodic deviation check.
//!
//! Reads only the price cache: no network I/O happens here apart from the
//! final broadcast.

use basis_alerts::{
    format_alert_message, AlertEvaluator, Notifier, Settings, ALERT_MESSAGE_LIMIT,
    MIN_CHECK_INTERVAL_SECS,
};
use basis_engine::DeviationEngine;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub type SharedSettings = Arc<RwLock<Settings>>;

/// What one check cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    NoRecipients,
    AllExchangesDisabled,
    /// Nothing crossed the threshold.
    Quiet { pairs: usize },
    Alerted { pairs: usize, alerts: usize, sent: usize, failed: usize },
}

pub struct AlertChecker {
    engine: DeviationEngine,
    evaluator: AlertEvaluator,
    notifier: Option<Notifier>,
    settings: SharedSettings,
}

impl AlertChecker {
    pub fn new(
        engine: DeviationEngine,
        evaluator: AlertEvaluator,
        notifier: Option<Notifier>,
        settings: SharedSettings,
    ) -> Self {
        Self {
            engine,
            evaluator,
            notifier,
            settings,
        }
    }

    fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one check against the current settings.
    pub async fn check_once(&self) -> CheckOutcome {
        let settings = self.settings();
        info!(
            "Check started: {} recipients, threshold {}%",
            settings.chat_ids.len(),
            settings.threshold_percent
        );

        if settings.chat_ids.is_empty() {
            info!("No chat ids registered, skipping alerts");
            return CheckOutcome::NoRecipients;
        }
        let enabled = settings.enabled_exchanges();
        if !enabled.any() {
            info!("All exchanges disabled, skipping");
            return CheckOutcome::AllExchangesDisabled;
        }

        let all = self.engine.get_all_deviations(&enabled);
        let pairs: usize = all.iter().map(|(_, deviations)| deviations.len()).sum();
        debug!("{} pairs with both spot and futures prices", pairs);

        let alerts = self.evaluator.evaluate_all(&all, settings.threshold_percent);
        info!(
            "Found {} alerts above threshold {}%",
            alerts.len(),
            settings.threshold_percent
        );
        if alerts.is_empty() {
            return CheckOutcome::Quiet { pairs };
        }

        let message = format_alert_message(&alerts, ALERT_MESSAGE_LIMIT);
        let (sent, failed) = match &self.notifier {
            Some(notifier) => {
                let report = notifier.broadcast(&settings.chat_ids, &message).await;
                (report.sent, report.failed)
            }
            None => {
                info!("Telegram disabled, alert not sent:\n{}", message);
                (0, 0)
            }
        };

        CheckOutcome::Alerted {
            pairs,
            alerts: alerts.len(),
            sent,
            failed,
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(
            self.settings()
                .check_interval_seconds
                .max(MIN_CHECK_INTERVAL_SECS),
        )
    }

    /// Check every `check_interval_seconds` until cancelled. The interval is
    /// re-read after each cycle and never drops below the minimum.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Alert checker started");
        loop {
            let interval = self.interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.check_once().await;
        }
        info!("Alert checker stopped");
    }
}
