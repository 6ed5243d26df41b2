use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditDecision {
    Accepted,
    Corrected,
    Rejected,
    Completed,
    Failed,
}

impl AuditDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditDecision::Accepted => "ACCEPTED",
            AuditDecision::Corrected => "CORRECTED",
            AuditDecision::Rejected => "REJECTED",
            AuditDecision::Completed => "COMPLETED",
            AuditDecision::Failed => "FAILED",
        }
    }
}

impl FromStr for AuditDecision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCEPTED" => Ok(AuditDecision::Accepted),
            "CORRECTED" => Ok(AuditDecision::Corrected),
            "REJECTED" => Ok(AuditDecision::Rejected),
            "COMPLETED" => Ok(AuditDecision::Completed),
            "FAILED" => Ok(AuditDecision::Failed),
            other => Err(anyhow::anyhow!("unknown audit decision {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub payment_id: Uuid,
    pub payment_amount: Decimal,
    pub order_amount: Decimal,
    pub gateway_amount: Option<Decimal>,
    pub mismatch_ratio: Option<Decimal>,
    pub decision: AuditDecision,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
