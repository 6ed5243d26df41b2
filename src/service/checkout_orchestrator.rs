use crate::domain::checkout::{request_hash, validate_checkout, CheckoutRequest, PaymentInitResult};
use crate::domain::payment::{minor_to_major, GatewayAttempt, GatewayKind, PaymentRecord, PaymentStatus};
use crate::error::{CheckoutError, GatewayError};
use crate::gateways::{GatewayCheckout, GatewaySet};
use crate::repo::ports::{AttemptStore, PaymentStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(GatewayCheckout),
    RetryableFailure(GatewayError),
    FatalFailure(GatewayError),
}

pub fn classify_attempt(result: Result<GatewayCheckout, GatewayError>) -> AttemptOutcome {
    match result {
        Ok(checkout) => AttemptOutcome::Success(checkout),
        Err(e) if e.retryable => AttemptOutcome::RetryableFailure(e),
        Err(e) => AttemptOutcome::FatalFailure(e),
    }
}

/// Preferred gateway first, then the configured defaults, without repeats.
pub fn priority_order(preferred: Option<GatewayKind>, defaults: &[GatewayKind]) -> Vec<GatewayKind> {
    let mut order = Vec::with_capacity(defaults.len() + 1);
    for kind in preferred.into_iter().chain(defaults.iter().copied()) {
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    order
}

fn new_reference() -> String {
    format!("PH-{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    pub gateways: GatewaySet,
    pub default_priority: Vec<GatewayKind>,
    pub payments: Arc<dyn PaymentStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub call_timeout: Duration,
}

impl CheckoutOrchestrator {
    pub async fn checkout(
        &self,
        req: CheckoutRequest,
        preferred: Option<GatewayKind>,
    ) -> Result<PaymentInitResult, CheckoutError> {
        validate_checkout(&req)?;
        let hash = request_hash(&req);

        if let Some(found) = self.existing(&req.idempotency_reference, &hash).await? {
            return Ok(found);
        }

        let order = priority_order(preferred, &self.default_priority);
        if order.is_empty() {
            return Err(CheckoutError::NoGateway);
        }

        // A claim outlives the slowest possible run through every gateway, then goes stale.
        let hold = self.call_timeout * (order.len() as u32 + 1);
        let stale_before = chrono::Utc::now()
            - chrono::Duration::from_std(hold).unwrap_or_else(|_| chrono::Duration::minutes(5));
        if !self
            .payments
            .reserve_checkout(&req.idempotency_reference, stale_before)
            .await?
        {
            if let Some(found) = self.existing(&req.idempotency_reference, &hash).await? {
                return Ok(found);
            }
            tracing::info!(
                idempotency_reference = %req.idempotency_reference,
                "checkout already running for idempotency reference"
            );
            return Err(CheckoutError::InProgress);
        }

        let result = self.attempt_gateways(&req, &hash, order).await;
        if let Err(e) = self.payments.release_checkout(&req.idempotency_reference).await {
            tracing::warn!(
                idempotency_reference = %req.idempotency_reference,
                "failed to release checkout reservation: {}",
                e
            );
        }
        result
    }

    /// The stored payment for this reference, if its request matches.
    async fn existing(
        &self,
        idempotency_reference: &str,
        hash: &str,
    ) -> Result<Option<PaymentInitResult>, CheckoutError> {
        let Some(found) = self.payments.find_by_idempotency(idempotency_reference).await? else {
            return Ok(None);
        };
        if found.request_hash != hash {
            return Err(CheckoutError::IdempotencyConflict);
        }
        tracing::info!(
            payment_id = %found.id,
            idempotency_reference = %idempotency_reference,
            "returning existing payment for idempotency reference"
        );
        Ok(Some(PaymentInitResult {
            record: found,
            reused: true,
        }))
    }

    async fn attempt_gateways(
        &self,
        req: &CheckoutRequest,
        hash: &str,
        order: Vec<GatewayKind>,
    ) -> Result<PaymentInitResult, CheckoutError> {
        let previous = self
            .attempts
            .list_by_reference(&req.idempotency_reference)
            .await?
            .len() as i32;
        let mut attempts: Vec<GatewayAttempt> = Vec::new();
        let mut last_error: Option<GatewayError> = None;

        for kind in order {
            let adapter = self.gateways.adapter(kind);
            let reference = new_reference();
            let start = Instant::now();

            let result = match tokio::time::timeout(
                self.call_timeout,
                adapter.create_checkout(req, &reference),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(GatewayError::retryable(format!(
                    "{} did not answer within {}ms",
                    kind,
                    self.call_timeout.as_millis()
                ))),
            };

            let outcome = classify_attempt(result);
            let failure = match &outcome {
                AttemptOutcome::Success(_) => None,
                AttemptOutcome::RetryableFailure(e) | AttemptOutcome::FatalFailure(e) => Some(e.clone()),
            };
            let attempt = GatewayAttempt {
                idempotency_reference: req.idempotency_reference.clone(),
                attempt_number: previous + attempts.len() as i32 + 1,
                gateway: kind,
                success: failure.is_none(),
                retryable: failure.as_ref().is_some_and(|e| e.retryable),
                error: failure.as_ref().map(|e| e.message.clone()),
                latency_ms: start.elapsed().as_millis() as i32,
                created_at: chrono::Utc::now(),
            };
            if let Err(e) = self.attempts.insert(&attempt).await {
                tracing::error!(gateway = %kind, "failed to persist gateway attempt: {}", e);
            }
            attempts.push(attempt);

            match outcome {
                AttemptOutcome::Success(checkout) => {
                    let record = PaymentRecord {
                        id: Uuid::new_v4(),
                        order_id: req.order_id,
                        idempotency_reference: req.idempotency_reference.clone(),
                        request_hash: hash.to_string(),
                        reference,
                        amount: minor_to_major(req.amount_minor),
                        currency: req.currency.clone(),
                        gateway: kind,
                        gateway_reference: checkout.gateway_reference,
                        checkout_url: Some(checkout.payment_url),
                        status: PaymentStatus::Pending,
                        attempts: previous + attempts.len() as i32,
                        created_at: chrono::Utc::now(),
                        completed_at: None,
                        failure_reason: None,
                        gateway_response: None,
                    };
                    let (stored, created) = self.payments.insert_pending(record).await?;
                    if created {
                        tracing::info!(
                            payment_id = %stored.id,
                            gateway = %kind,
                            reference = %stored.reference,
                            attempts = stored.attempts,
                            "checkout created"
                        );
                    } else {
                        tracing::warn!(
                            payment_id = %stored.id,
                            gateway = %kind,
                            "concurrent checkout already stored a payment for this idempotency reference"
                        );
                    }
                    return Ok(PaymentInitResult {
                        record: stored,
                        reused: !created,
                    });
                }
                AttemptOutcome::RetryableFailure(e) => {
                    tracing::info!(gateway = %kind, error = %e, "gateway failed, trying next");
                    last_error = Some(e);
                }
                AttemptOutcome::FatalFailure(e) => {
                    tracing::warn!(gateway = %kind, error = %e, "gateway rejected checkout, skipping");
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| GatewayError::fatal("no gateway attempted"));
        tracing::error!(
            idempotency_reference = %req.idempotency_reference,
            attempts = attempts.len(),
            last_error = %last_error,
            "all gateways failed"
        );
        Err(CheckoutError::OrchestrationExhausted {
            last_error,
            attempts,
        })
    }
}
