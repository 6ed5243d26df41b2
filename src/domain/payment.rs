use crate::error::SettlementError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Paystack,
    Flutterwave,
    Monnify,
}

impl GatewayKind {
    pub const ALL: [GatewayKind; 3] = [
        GatewayKind::Paystack,
        GatewayKind::Flutterwave,
        GatewayKind::Monnify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Paystack => "paystack",
            GatewayKind::Flutterwave => "flutterwave",
            GatewayKind::Monnify => "monnify",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paystack" => Ok(GatewayKind::Paystack),
            "flutterwave" => Ok(GatewayKind::Flutterwave),
            "monnify" => Ok(GatewayKind::Monnify),
            other => Err(SettlementError::UnknownGateway(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl FromStr for PaymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(anyhow::anyhow!("unknown payment status {other}")),
        }
    }
}

/// Order-side status owned by the storefront; only the values settlement writes are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PROCESSING" => Ok(OrderStatus::Processing),
            other => Err(anyhow::anyhow!("unknown order status {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub idempotency_reference: String,
    pub request_hash: String,
    pub reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub gateway: GatewayKind,
    pub gateway_reference: Option<String>,
    pub checkout_url: Option<String>,
    pub status: PaymentStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
}

impl PaymentRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Values written by the single PENDING -> COMPLETED transition.
#[derive(Debug, Clone)]
pub struct Completion {
    pub amount: Decimal,
    pub gateway_reference: Option<String>,
    pub gateway_response: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayAttempt {
    pub idempotency_reference: String,
    pub attempt_number: i32,
    pub gateway: GatewayKind,
    pub success: bool,
    pub retryable: bool,
    pub error: Option<String>,
    pub latency_ms: i32,
    pub created_at: DateTime<Utc>,
}

/// Converts an integer amount in minor units (kobo) to major units (naira).
pub fn minor_to_major(amount_minor: i64) -> Decimal {
    Decimal::new(amount_minor, 2)
}
