use crate::domain::payment::GatewayKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeOutcome {
    Succeeded,
    /// One charge attempt was declined. The checkout stays open and the customer may retry.
    AttemptFailed,
    /// The gateway closed the checkout without payment (expired, cancelled, reversed).
    Closed,
    Other,
}

/// A verified gateway callback, normalized to major units.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub gateway: GatewayKind,
    pub event_type: String,
    pub reference: String,
    pub gateway_reference: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub outcome: ChargeOutcome,
    pub signature: String,
    pub raw_body: serde_json::Value,
}

/// What the processor did with a delivery. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Completed { payment_id: uuid::Uuid },
    Failed { payment_id: uuid::Uuid },
    AttemptFailed { payment_id: uuid::Uuid },
    AlreadyProcessed { payment_id: uuid::Uuid },
    UnknownReference,
    Ignored,
}
