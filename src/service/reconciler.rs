use crate::domain::webhook::{ChargeOutcome, WebhookOutcome};
use crate::gateways::GatewaySet;
use crate::repo::ports::PaymentStore;
use crate::service::webhook_processor::WebhookProcessor;
use anyhow::Result;
use std::sync::Arc;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Polls gateways for payments whose webhook never arrived.
#[derive(Clone)]
pub struct Reconciler {
    pub gateways: GatewaySet,
    pub payments: Arc<dyn PaymentStore>,
    pub processor: WebhookProcessor,
    pub grace: chrono::Duration,
    pub batch_size: i64,
}

impl Reconciler {
    pub async fn run_once(&self) -> Result<ReconcileSummary> {
        let cutoff = chrono::Utc::now() - self.grace;
        let pending = self.payments.list_pending_before(cutoff, self.batch_size).await?;
        let mut summary = ReconcileSummary::default();

        for record in pending {
            summary.checked += 1;
            let payment_id = record.id;
            let gateway = record.gateway;
            let report = match self
                .gateways
                .adapter(gateway)
                .fetch_status(&record.reference)
                .await
            {
                Ok(report) => report,
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(
                        payment_id = %payment_id,
                        gateway = %gateway,
                        retryable = e.retryable,
                        "status poll failed: {}",
                        e
                    );
                    continue;
                }
            };

            if matches!(report.outcome, ChargeOutcome::Other | ChargeOutcome::AttemptFailed) {
                summary.still_pending += 1;
                continue;
            }

            match self.processor.settle(record, report).await {
                Ok(WebhookOutcome::Completed { .. }) => summary.completed += 1,
                Ok(WebhookOutcome::Failed { .. }) => summary.failed += 1,
                Ok(_) => summary.skipped += 1,
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(payment_id = %payment_id, "reconciliation failed: {}", e);
                }
            }
        }

        if summary.checked > 0 {
            tracing::info!(
                checked = summary.checked,
                completed = summary.completed,
                failed = summary.failed,
                still_pending = summary.still_pending,
                errors = summary.errors,
                "reconciliation pass finished"
            );
        }
        Ok(summary)
    }
}
