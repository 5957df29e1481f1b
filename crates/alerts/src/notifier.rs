//! Fan-out of one message to every registered chat.

use crate::AlertSender;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Notifier {
    sender: Arc<dyn AlertSender>,
}

impl Notifier {
    pub fn new(sender: Arc<dyn AlertSender>) -> Self {
        Self { sender }
    }

    /// Send `text` to each chat in order. A failed send is logged and counted;
    /// the remaining chats are still tried.
    pub async fn broadcast(&self, chat_ids: &[i64], text: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for &chat_id in chat_ids {
            match self.sender.send(chat_id, text).await {
                Ok(()) => {
                    info!("Alert sent to {}", chat_id);
                    report.sent += 1;
                }
                Err(e) => {
                    error!("Error sending alert to {}: {}", chat_id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}


#[cfg(test)]
mod tests {
    use super::mock::RecordingSender;
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_broadcast_reaches_every_chat() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = Notifier::new(sender.clone());

        let report = notifier.broadcast(&[1, 2], "hello").await;
        assert_eq!(report, BroadcastReport { sent: 2, failed: 0 });
        assert_eq!(
            *sender.sent.lock().unwrap(),
            vec![(1, "hello".to_string()), (2, "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_broadcast() {
        let sender = Arc::new(RecordingSender {
            failing: vec![2],
            ..Default::default()
        });
        let notifier = Notifier::new(sender.clone());

        let report = notifier.broadcast(&[1, 2, 3], "alert").await;
        assert_eq!(report, BroadcastReport { sent: 2, failed: 1 });
        let chats: Vec<i64> = sender.sent.lock().unwrap().iter().map(|(c, _)| *c).collect();
        assert_eq!(chats, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_no_recipients() {
        let notifier = Notifier::new(Arc::new(RecordingSender::default()));
        assert_eq!(notifier.broadcast(&[], "x").await, BroadcastReport::default());
    }
}
