use crate::domain::audit::{AuditDecision, AuditEntry};
use crate::domain::payment::{Completion, GatewayKind, OrderStatus, PaymentRecord, PaymentStatus};
use crate::domain::webhook::{ChargeOutcome, WebhookOutcome};
use crate::error::SettlementError;
use crate::gateways::{GatewaySet, GatewayStatusReport};
use crate::repo::ports::{OrderStore, OrderSync, OrderSyncQueue, PaymentStore};
use crate::service::amount_validator::AmountValidator;
use crate::service::audit_log::SettlementAuditLog;
use crate::service::notifier::{Notifier, PaymentNotification};
use crate::service::order_sync_relay::backoff_seconds;
use rust_decimal::Decimal;
use std::sync::Arc;

pub const CHECKOUT_CLOSED_REASON: &str = "gateway closed the checkout without payment";

#[derive(Clone)]
pub struct WebhookProcessor {
    pub gateways: GatewaySet,
    pub payments: Arc<dyn PaymentStore>,
    pub orders: Arc<dyn OrderStore>,
    pub order_sync: Arc<dyn OrderSyncQueue>,
    pub validator: AmountValidator,
    pub audit: SettlementAuditLog,
    pub notifier: Arc<dyn Notifier>,
}

impl WebhookProcessor {
    /// Verifies and applies one gateway callback. Nothing is read or written before the
    /// signature checks out.
    pub async fn handle(
        &self,
        kind: GatewayKind,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, SettlementError> {
        let event = match self.gateways.adapter(kind).verify_webhook(raw_body, signature) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(gateway = %kind, "webhook rejected: {}", e);
                return Err(e.into());
            }
        };

        tracing::info!(
            gateway = %kind,
            event_type = %event.event_type,
            reference = %event.reference,
            amount = %event.amount,
            "webhook received"
        );

        let record = match self.payments.find_by_reference(kind, &event.reference).await? {
            Some(r) => Some(r),
            None => match event.gateway_reference.as_deref() {
                Some(gw_ref) => self.payments.find_by_reference(kind, gw_ref).await?,
                None => None,
            },
        };
        let Some(record) = record else {
            tracing::warn!(
                gateway = %kind,
                reference = %event.reference,
                "webhook for unknown payment reference ignored"
            );
            return Ok(WebhookOutcome::UnknownReference);
        };

        self.settle(record, event.into()).await
    }

    /// Drives a PENDING record to its terminal state from a gateway report. Shared by
    /// webhook delivery and status polling; replays are no-ops.
    pub async fn settle(
        &self,
        record: PaymentRecord,
        report: GatewayStatusReport,
    ) -> Result<WebhookOutcome, SettlementError> {
        if record.is_terminal() {
            tracing::info!(
                payment_id = %record.id,
                status = record.status.as_str(),
                "payment already settled, skipping"
            );
            return Ok(WebhookOutcome::AlreadyProcessed {
                payment_id: record.id,
            });
        }

        match report.outcome {
            ChargeOutcome::Other => Ok(WebhookOutcome::Ignored),
            ChargeOutcome::AttemptFailed => {
                tracing::warn!(
                    payment_id = %record.id,
                    gateway = %record.gateway,
                    reference = %record.reference,
                    "charge attempt declined, payment stays pending"
                );
                Ok(WebhookOutcome::AttemptFailed {
                    payment_id: record.id,
                })
            }
            ChargeOutcome::Closed => self.fail(&record, CHECKOUT_CLOSED_REASON, &report).await,
            ChargeOutcome::Succeeded => {
                let validation = self
                    .validator
                    .validate_record(&record, report.amount, &report.currency)
                    .await?;
                if !validation.accept {
                    let reason = validation
                        .reason
                        .unwrap_or_else(|| "settlement amount rejected".to_string());
                    return self.fail(&record, &reason, &report).await;
                }
                let amount = validation.corrected_amount.unwrap_or(report.amount);
                self.complete(&record, amount, &report).await
            }
        }
    }

    async fn complete(
        &self,
        record: &PaymentRecord,
        amount: Decimal,
        report: &GatewayStatusReport,
    ) -> Result<WebhookOutcome, SettlementError> {
        let completion = Completion {
            amount,
            gateway_reference: report.gateway_reference.clone(),
            gateway_response: report.raw.clone(),
            completed_at: chrono::Utc::now(),
        };
        let sync = OrderSync {
            order_id: record.order_id,
            payment_status: PaymentStatus::Completed,
            order_status: Some(OrderStatus::Processing),
        };
        let Some(task_id) = self
            .payments
            .complete_if_pending(record.id, &completion, &sync)
            .await?
        else {
            tracing::info!(payment_id = %record.id, "lost completion race, already settled");
            return Ok(WebhookOutcome::AlreadyProcessed {
                payment_id: record.id,
            });
        };

        tracing::info!(
            payment_id = %record.id,
            order_id = %record.order_id,
            gateway = %record.gateway,
            amount = %amount,
            "payment completed"
        );

        self.sync_order(record, task_id, sync).await;
        self.audit
            .record(AuditEntry {
                payment_id: record.id,
                payment_amount: amount,
                order_amount: self.order_amount_or(record, amount).await,
                gateway_amount: Some(report.amount),
                mismatch_ratio: None,
                decision: AuditDecision::Completed,
                reason: "payment completed".to_string(),
                created_at: completion.completed_at,
            })
            .await;
        self.notifier.notify(PaymentNotification {
            payment_id: record.id,
            order_id: record.order_id,
            status: PaymentStatus::Completed,
            amount,
            currency: record.currency.clone(),
            gateway: record.gateway,
            reference: record.reference.clone(),
            reason: None,
        });

        Ok(WebhookOutcome::Completed {
            payment_id: record.id,
        })
    }

    async fn fail(
        &self,
        record: &PaymentRecord,
        reason: &str,
        report: &GatewayStatusReport,
    ) -> Result<WebhookOutcome, SettlementError> {
        let at = chrono::Utc::now();
        let sync = OrderSync {
            order_id: record.order_id,
            payment_status: PaymentStatus::Failed,
            order_status: None,
        };
        let Some(task_id) = self
            .payments
            .fail_if_pending(record.id, reason, Some(&report.raw), at, &sync)
            .await?
        else {
            tracing::info!(payment_id = %record.id, "lost failure race, already settled");
            return Ok(WebhookOutcome::AlreadyProcessed {
                payment_id: record.id,
            });
        };

        tracing::warn!(
            payment_id = %record.id,
            order_id = %record.order_id,
            gateway = %record.gateway,
            reason = %reason,
            "payment failed"
        );

        self.sync_order(record, task_id, sync).await;
        self.audit
            .record(AuditEntry {
                payment_id: record.id,
                payment_amount: record.amount,
                order_amount: self.order_amount_or(record, record.amount).await,
                gateway_amount: Some(report.amount),
                mismatch_ratio: None,
                decision: AuditDecision::Failed,
                reason: reason.to_string(),
                created_at: at,
            })
            .await;
        self.notifier.notify(PaymentNotification {
            payment_id: record.id,
            order_id: record.order_id,
            status: PaymentStatus::Failed,
            amount: record.amount,
            currency: record.currency.clone(),
            gateway: record.gateway,
            reference: record.reference.clone(),
            reason: Some(reason.to_string()),
        });

        Ok(WebhookOutcome::Failed {
            payment_id: record.id,
        })
    }

    /// Tries the queued order update inline. Success settles the task; failure hands it
    /// to the order-sync relay early. Either way the task already exists, so a crash here
    /// leaves the relay to finish the job.
    async fn sync_order(&self, record: &PaymentRecord, task_id: i64, sync: OrderSync) {
        match self
            .orders
            .set_payment_status(sync.order_id, sync.payment_status, sync.order_status)
            .await
        {
            Ok(()) => {
                if let Err(e) = self.order_sync.mark_done(task_id).await {
                    tracing::warn!(
                        payment_id = %record.id,
                        task_id,
                        "order updated but queued task not settled, relay will reapply: {}",
                        e
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    payment_id = %record.id,
                    order_id = %sync.order_id,
                    payment_status = sync.payment_status.as_str(),
                    "order update failed, leaving it to the relay: {}",
                    e
                );
                let next_attempt_at =
                    chrono::Utc::now() + chrono::Duration::seconds(backoff_seconds(1));
                if let Err(e) = self.order_sync.mark_retry(task_id, 1, next_attempt_at).await {
                    tracing::warn!(payment_id = %record.id, task_id, "could not reschedule order update: {}", e);
                }
            }
        }
    }

    async fn order_amount_or(&self, record: &PaymentRecord, fallback: Decimal) -> Decimal {
        match self.orders.order_total(record.order_id).await {
            Ok(Some(total)) => total,
            _ => fallback,
        }
    }
}
