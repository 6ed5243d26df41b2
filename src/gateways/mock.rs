use crate::domain::checkout::CheckoutRequest;
use crate::domain::payment::GatewayKind;
use crate::domain::webhook::{ChargeOutcome, WebhookEvent};
use crate::error::{GatewayError, SignatureError};
use crate::gateways::signature::verify_sha512_hex;
use crate::gateways::{
    json_decimal, json_str, parse_body, GatewayCheckout, GatewayStatusReport, PaymentGateway,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    RetryableFailure,
    FatalFailure,
    Hang(Duration),
}

/// In-process gateway for local runs and tests. Webhooks are `{event, data: {reference,
/// amount, currency, id}}` in major units, signed with hex HMAC-SHA512 in `x-signature`.
pub struct MockGateway {
    pub kind: GatewayKind,
    pub behavior: MockBehavior,
    pub webhook_secret: String,
    calls: AtomicUsize,
    status: Mutex<Option<GatewayStatusReport>>,
}

impl MockGateway {
    pub fn new(kind: GatewayKind, behavior: MockBehavior, webhook_secret: &str) -> Self {
        Self {
            kind,
            behavior,
            webhook_secret: webhook_secret.to_string(),
            calls: AtomicUsize::new(0),
            status: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sets the answer returned by the next status polls.
    pub fn set_status(&self, report: GatewayStatusReport) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = Some(report);
        }
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    fn kind(&self) -> GatewayKind {
        self.kind
    }

    fn signature_header(&self) -> &'static str {
        "x-signature"
    }

    async fn create_checkout(
        &self,
        _req: &CheckoutRequest,
        reference: &str,
    ) -> Result<GatewayCheckout, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Succeed => Ok(GatewayCheckout {
                payment_url: format!("https://checkout.mock/{}/{}", self.kind, reference),
                gateway_reference: Some(format!("mock_txn_{}", uuid::Uuid::new_v4().simple())),
            }),
            MockBehavior::RetryableFailure => Err(GatewayError::retryable("mock upstream 503")),
            MockBehavior::FatalFailure => Err(GatewayError::fatal("mock rejected request")),
            MockBehavior::Hang(d) => {
                tokio::time::sleep(*d).await;
                Err(GatewayError::retryable("mock hung"))
            }
        }
    }

    fn verify_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError> {
        verify_sha512_hex(&self.webhook_secret, raw_body, signature)?;
        let v = parse_body(raw_body)?;

        let event_type = json_str(&v, "event").unwrap_or_default();
        let data = v.get("data").cloned().unwrap_or_default();
        let outcome = match event_type.as_str() {
            "charge.success" => ChargeOutcome::Succeeded,
            "charge.failed" => ChargeOutcome::AttemptFailed,
            "charge.closed" => ChargeOutcome::Closed,
            _ => ChargeOutcome::Other,
        };

        Ok(WebhookEvent {
            gateway: self.kind,
            event_type,
            reference: json_str(&data, "reference").unwrap_or_default(),
            gateway_reference: json_str(&data, "id"),
            amount: json_decimal(&data, "amount").unwrap_or_default(),
            currency: json_str(&data, "currency").unwrap_or_default().to_uppercase(),
            outcome,
            signature: signature.unwrap_or_default().to_string(),
            raw_body: v,
        })
    }

    async fn fetch_status(&self, reference: &str) -> Result<GatewayStatusReport, GatewayError> {
        let configured = self.status.lock().ok().and_then(|g| g.clone());
        match configured {
            Some(report) => Ok(report),
            None => Err(GatewayError::retryable(format!("no status for {reference}"))),
        }
    }
}
