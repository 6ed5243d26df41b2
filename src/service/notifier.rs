use crate::domain::payment::{GatewayKind, PaymentStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentNotification {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
    pub gateway: GatewayKind,
    pub reference: String,
    pub reason: Option<String>,
}

/// Fire-and-forget side channel for terminal payment transitions.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: PaymentNotification);
}

#[derive(Clone)]
pub struct HttpNotifier {
    pub client: reqwest::Client,
    pub target_url: Option<String>,
}

impl Notifier for HttpNotifier {
    fn notify(&self, notification: PaymentNotification) {
        let Some(url) = self.target_url.clone() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            let res = client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("X-Event-Type", format!("payment.{}", notification.status.as_str().to_lowercase()))
                .json(&notification)
                .send()
                .await;
            match res {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => tracing::warn!(
                    payment_id = %notification.payment_id,
                    status = resp.status().as_u16(),
                    "payment notification rejected"
                ),
                Err(e) => tracing::warn!(
                    payment_id = %notification.payment_id,
                    "payment notification failed: {}",
                    e
                ),
            }
        });
    }
}

/// Keeps notifications in memory instead of sending them.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<PaymentNotification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<PaymentNotification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: PaymentNotification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
