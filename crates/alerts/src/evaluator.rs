//! Threshold and mute filtering of ranked deviations.

use crate::MuteRegistry;
use basis_core::{Deviation, Exchange};
use std::sync::Arc;

/// A deviation that crossed the threshold on one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub exchange: Exchange,
    pub deviation: Deviation,
}

pub struct AlertEvaluator {
    mutes: Arc<MuteRegistry>,
}

impl AlertEvaluator {
    pub fn new(mutes: Arc<MuteRegistry>) -> Self {
        Self { mutes }
    }

    pub fn mutes(&self) -> &Arc<MuteRegistry> {
        &self.mutes
    }

    /// Deviations with `|percent| >= threshold` whose coin is not muted, in
    /// input order.
    ///
    /// The mute registry is only consulted for entries past the threshold, so
    /// only those can prune an expired mute.
    pub fn evaluate(&self, exchange: Exchange, deviations: &[Deviation], threshold: f64) -> Vec<Alert> {
        deviations
            .iter()
            .filter(|d| d.abs_percent() >= threshold)
            .filter(|d| !self.mutes.is_muted(d.coin.as_str()))
            .map(|d| Alert {
                exchange,
                deviation: d.clone(),
            })
            .collect()
    }

    /// [`evaluate`](Self::evaluate) per exchange, concatenated in the given order.
    pub fn evaluate_all(&self, all: &[(Exchange, Vec<Deviation>)], threshold: f64) -> Vec<Alert> {
        all.iter()
            .flat_map(|(exchange, deviations)| self.evaluate(*exchange, deviations, threshold))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use basis_core::{normalize, DEFAULT_FUNDING_LABEL};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn deviation(coin: &str, percent: f64) -> Deviation {
        Deviation {
            coin: normalize(coin).unwrap(),
            spot_price: 100.0,
            futures_price: 100.0 + percent,
            deviation_percent: percent,
            funding_rate_percent: 0.0,
            time_to_next_funding: DEFAULT_FUNDING_LABEL.to_string(),
        }
    }

    fn summary(alerts: &[Alert]) -> Vec<(Exchange, &str, f64)> {
        alerts
            .iter()
            .map(|a| (a.exchange, a.deviation.coin.as_str(), a.deviation.deviation_percent))
            .collect()
    }

    fn evaluator() -> (AlertEvaluator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mutes = Arc::new(MuteRegistry::new(clock.clone()));
        (AlertEvaluator::new(mutes), clock)
    }

    #[test]
    fn test_mute_suppresses_until_unmuted() {
        let (evaluator, _clock) = evaluator();
        let deviations = vec![deviation("BTC", 5.0), deviation("ETH", 0.5)];

        evaluator.mutes().mute("BTC", 1.0).unwrap();
        assert!(evaluator.evaluate(Exchange::Bybit, &deviations, 1.0).is_empty());

        evaluator.mutes().unmute("BTC");
        let alerts = evaluator.evaluate(Exchange::Bybit, &deviations, 1.0);
        assert_eq!(summary(&alerts), vec![(Exchange::Bybit, "BTC", 5.0)]);
    }

    #[test]
    fn test_below_threshold_never_alerts() {
        let (evaluator, _clock) = evaluator();
        let deviations = vec![deviation("ETH", 0.5), deviation("SOL", -0.99)];
        assert!(evaluator.evaluate(Exchange::Binance, &deviations, 1.0).is_empty());

        evaluator.mutes().mute("ETH", 1.0).unwrap();
        assert!(evaluator.evaluate(Exchange::Binance, &deviations, 1.0).is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive_and_absolute() {
        let (evaluator, _clock) = evaluator();
        let deviations = vec![deviation("DOGE", -3.0), deviation("XRP", 1.0)];
        let alerts = evaluator.evaluate(Exchange::GateIO, &deviations, 1.0);
        assert_eq!(
            summary(&alerts),
            vec![(Exchange::GateIO, "DOGE", -3.0), (Exchange::GateIO, "XRP", 1.0)]
        );
    }

    #[test]
    fn test_expired_mute_alerts_again() {
        let (evaluator, clock) = evaluator();
        let deviations = vec![deviation("BTC", 5.0)];

        evaluator.mutes().mute("BTC", 1.0).unwrap();
        clock.advance(Duration::minutes(61));

        assert_eq!(evaluator.evaluate(Exchange::Bybit, &deviations, 1.0).len(), 1);
        assert!(evaluator.mutes().is_empty());
    }

    #[test]
    fn test_mutes_not_consulted_below_threshold() {
        let (evaluator, clock) = evaluator();
        evaluator.mutes().mute("ETH", 1.0).unwrap();
        clock.advance(Duration::hours(2));

        evaluator.evaluate(Exchange::Bybit, &[deviation("ETH", 0.5)], 1.0);
        // Expired but never looked up, so still stored
        assert_eq!(evaluator.mutes().len(), 1);
    }

    #[test]
    fn test_evaluate_all_preserves_exchange_order() {
        let (evaluator, _clock) = evaluator();
        let all = vec![
            (Exchange::Binance, vec![deviation("BTC", 2.0)]),
            (Exchange::Bybit, vec![]),
            (
                Exchange::GateIO,
                vec![deviation("PEPE", -4.0), deviation("BTC", 1.5), deviation("ETH", 0.1)],
            ),
        ];

        let alerts = evaluator.evaluate_all(&all, 1.0);
        assert_eq!(
            summary(&alerts),
            vec![
                (Exchange::Binance, "BTC", 2.0),
                (Exchange::GateIO, "PEPE", -4.0),
                (Exchange::GateIO, "BTC", 1.5),
            ]
        );
    }
}
