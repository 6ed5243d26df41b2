use crate::config::AmountPolicy;
use crate::domain::audit::{AuditDecision, AuditEntry};
use crate::domain::payment::PaymentRecord;
use crate::error::{AmountMismatchError, SettlementError};
use crate::repo::ports::{OrderStore, PaymentStore};
use crate::service::audit_log::SettlementAuditLog;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum AmountDecision {
    Accept,
    Correct { corrected: Decimal, reason: String },
    Reject { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmountEvaluation {
    pub decision: AmountDecision,
    pub normalized: Decimal,
    pub ratio: Option<Decimal>,
}

/// Outcome handed back to the webhook processor.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub accept: bool,
    pub corrected_amount: Option<Decimal>,
    pub reason: Option<String>,
}

/// Pure decision over one claimed settlement amount.
///
/// An empty `claimed_currency` means the gateway did not report one and the payment's
/// own currency is assumed.
pub fn evaluate(
    policy: &AmountPolicy,
    order_total: Decimal,
    payment: &PaymentRecord,
    claimed: Decimal,
    claimed_currency: &str,
) -> AmountEvaluation {
    let currency = if claimed_currency.trim().is_empty() {
        payment.currency.to_uppercase()
    } else {
        claimed_currency.trim().to_uppercase()
    };

    if currency != payment.currency.to_uppercase() {
        return AmountEvaluation {
            decision: AmountDecision::Reject {
                reason: format!(
                    "currency mismatch: gateway reported {} {}, payment is in {}",
                    claimed, currency, payment.currency
                ),
            },
            normalized: claimed,
            ratio: None,
        };
    }

    if claimed <= Decimal::ZERO {
        return AmountEvaluation {
            decision: AmountDecision::Reject {
                reason: format!("gateway reported a non-positive amount {claimed}"),
            },
            normalized: claimed,
            ratio: None,
        };
    }

    let normalized = if currency == policy.local_currency && claimed > policy.minor_unit_threshold {
        claimed / Decimal::ONE_HUNDRED
    } else {
        claimed
    };
    let ratio = order_total.checked_div(normalized).map(|r| r.round_dp(4));

    if (order_total - normalized).abs() <= policy.tolerance {
        let decision = if normalized != claimed {
            AmountDecision::Correct {
                corrected: normalized,
                reason: format!(
                    "gateway reported {claimed} in minor units; normalized to {normalized} against order total {order_total}"
                ),
            }
        } else {
            AmountDecision::Accept
        };
        return AmountEvaluation {
            decision,
            normalized,
            ratio,
        };
    }

    if policy.autocorrect_enabled {
        let inverse = normalized.checked_div(order_total).map(|r| r.round_dp(4));
        let in_band = |r: Option<Decimal>| {
            r.is_some_and(|r| r >= policy.ratio_band_low && r <= policy.ratio_band_high)
        };
        if in_band(ratio) || in_band(inverse) {
            return AmountEvaluation {
                decision: AmountDecision::Correct {
                    corrected: order_total,
                    reason: format!(
                        "unit-factor correction: gateway reported {claimed}, order total {order_total}, ratio {}",
                        ratio.map(|r| r.to_string()).unwrap_or_else(|| "n/a".to_string())
                    ),
                },
                normalized,
                ratio,
            };
        }
    }

    let mismatch = AmountMismatchError {
        claimed,
        currency,
        order_total,
        payment_amount: payment.amount,
        ratio: ratio.map(|r| r.to_string()).unwrap_or_else(|| "n/a".to_string()),
    };
    AmountEvaluation {
        decision: AmountDecision::Reject {
            reason: mismatch.to_string(),
        },
        normalized,
        ratio,
    }
}

#[derive(Clone)]
pub struct AmountValidator {
    pub policy: AmountPolicy,
    pub payments: Arc<dyn PaymentStore>,
    pub orders: Arc<dyn OrderStore>,
    pub audit: SettlementAuditLog,
}

impl AmountValidator {
    pub async fn validate(
        &self,
        payment_id: Uuid,
        claimed: Decimal,
        claimed_currency: &str,
    ) -> Result<ValidationResult, SettlementError> {
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or(SettlementError::PaymentNotFound(payment_id))?;
        self.validate_record(&payment, claimed, claimed_currency).await
    }

    /// Validates against an already loaded record and appends the audit entry.
    pub async fn validate_record(
        &self,
        payment: &PaymentRecord,
        claimed: Decimal,
        claimed_currency: &str,
    ) -> Result<ValidationResult, SettlementError> {
        let Some(order_total) = self.orders.order_total(payment.order_id).await? else {
            let reason = format!("order {} not found; cannot verify amount", payment.order_id);
            self.audit
                .record(AuditEntry {
                    payment_id: payment.id,
                    payment_amount: payment.amount,
                    order_amount: Decimal::ZERO,
                    gateway_amount: Some(claimed),
                    mismatch_ratio: None,
                    decision: AuditDecision::Rejected,
                    reason: reason.clone(),
                    created_at: chrono::Utc::now(),
                })
                .await;
            return Ok(ValidationResult {
                accept: false,
                corrected_amount: None,
                reason: Some(reason),
            });
        };

        let eval = evaluate(&self.policy, order_total, payment, claimed, claimed_currency);
        let (decision, result) = match &eval.decision {
            AmountDecision::Accept => (
                AuditDecision::Accepted,
                ValidationResult {
                    accept: true,
                    corrected_amount: None,
                    reason: None,
                },
            ),
            AmountDecision::Correct { corrected, reason } => {
                tracing::warn!(
                    payment_id = %payment.id,
                    claimed = %claimed,
                    corrected = %corrected,
                    order_total = %order_total,
                    "settlement amount corrected"
                );
                (
                    AuditDecision::Corrected,
                    ValidationResult {
                        accept: true,
                        corrected_amount: Some(*corrected),
                        reason: Some(reason.clone()),
                    },
                )
            }
            AmountDecision::Reject { reason } => {
                tracing::error!(
                    payment_id = %payment.id,
                    claimed = %claimed,
                    order_total = %order_total,
                    payment_amount = %payment.amount,
                    ratio = ?eval.ratio,
                    "settlement amount rejected"
                );
                (
                    AuditDecision::Rejected,
                    ValidationResult {
                        accept: false,
                        corrected_amount: None,
                        reason: Some(reason.clone()),
                    },
                )
            }
        };

        self.audit
            .record(AuditEntry {
                payment_id: payment.id,
                payment_amount: payment.amount,
                order_amount: order_total,
                gateway_amount: Some(claimed),
                mismatch_ratio: eval.ratio,
                decision,
                reason: result
                    .reason
                    .clone()
                    .unwrap_or_else(|| "amount within tolerance".to_string()),
                created_at: chrono::Utc::now(),
            })
            .await;

        Ok(result)
    }
}
