use crate::config::AppConfig;
use crate::domain::checkout::CheckoutRequest;
use crate::domain::payment::GatewayKind;
use crate::domain::webhook::{ChargeOutcome, WebhookEvent};
use crate::error::{GatewayError, SignatureError};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

pub mod flutterwave;
pub mod mock;
pub mod monnify;
pub mod paystack;
pub mod signature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCheckout {
    pub payment_url: String,
    pub gateway_reference: Option<String>,
}

/// Answer to a status poll, in major units.
#[derive(Debug, Clone)]
pub struct GatewayStatusReport {
    pub reference: String,
    pub gateway_reference: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub outcome: ChargeOutcome,
    pub raw: serde_json::Value,
}

impl From<WebhookEvent> for GatewayStatusReport {
    fn from(event: WebhookEvent) -> Self {
        GatewayStatusReport {
            reference: event.reference,
            gateway_reference: event.gateway_reference,
            amount: event.amount,
            currency: event.currency,
            outcome: event.outcome,
            raw: event.raw_body,
        }
    }
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Header carrying the webhook signature for this provider.
    fn signature_header(&self) -> &'static str;

    async fn create_checkout(
        &self,
        req: &CheckoutRequest,
        reference: &str,
    ) -> Result<GatewayCheckout, GatewayError>;

    fn verify_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError>;

    async fn fetch_status(&self, reference: &str) -> Result<GatewayStatusReport, GatewayError>;
}

/// One adapter per supported gateway. Adding a `GatewayKind` variant fails to compile
/// until it is wired here.
#[derive(Clone)]
pub struct GatewaySet {
    pub paystack: Arc<dyn PaymentGateway>,
    pub flutterwave: Arc<dyn PaymentGateway>,
    pub monnify: Arc<dyn PaymentGateway>,
}

impl GatewaySet {
    pub fn from_config(cfg: &AppConfig, client: reqwest::Client) -> Self {
        Self {
            paystack: Arc::new(paystack::PaystackGateway {
                base_url: cfg.paystack.base_url.clone(),
                secret_key: cfg.paystack.secret_key.clone(),
                callback_url: cfg.callback_url.clone(),
                timeout_ms: cfg.gateway_timeout_ms,
                client: client.clone(),
            }),
            flutterwave: Arc::new(flutterwave::FlutterwaveGateway {
                base_url: cfg.flutterwave.base_url.clone(),
                secret_key: cfg.flutterwave.secret_key.clone(),
                webhook_hash: cfg.flutterwave.webhook_hash.clone(),
                callback_url: cfg.callback_url.clone(),
                timeout_ms: cfg.gateway_timeout_ms,
                client: client.clone(),
            }),
            monnify: Arc::new(monnify::MonnifyGateway {
                base_url: cfg.monnify.base_url.clone(),
                api_key: cfg.monnify.api_key.clone(),
                secret_key: cfg.monnify.secret_key.clone(),
                contract_code: cfg.monnify.contract_code.clone(),
                callback_url: cfg.callback_url.clone(),
                timeout_ms: cfg.gateway_timeout_ms,
                client,
            }),
        }
    }

    /// Local development wiring: every slot is a mock that signs with `secret`.
    pub fn mocks(secret: &str) -> Self {
        let mock = |kind| -> Arc<dyn PaymentGateway> {
            Arc::new(mock::MockGateway::new(kind, mock::MockBehavior::Succeed, secret))
        };
        Self {
            paystack: mock(GatewayKind::Paystack),
            flutterwave: mock(GatewayKind::Flutterwave),
            monnify: mock(GatewayKind::Monnify),
        }
    }

    pub fn adapter(&self, kind: GatewayKind) -> &Arc<dyn PaymentGateway> {
        match kind {
            GatewayKind::Paystack => &self.paystack,
            GatewayKind::Flutterwave => &self.flutterwave,
            GatewayKind::Monnify => &self.monnify,
        }
    }
}

pub(crate) fn send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::retryable("gateway timeout")
    } else if e.is_builder() {
        GatewayError::fatal(format!("invalid gateway request: {e}"))
    } else {
        GatewayError::retryable(format!("network error: {e}"))
    }
}

pub(crate) fn status_error(status: StatusCode, body: &str) -> GatewayError {
    let message = format!(
        "HTTP_{}: {}",
        status.as_u16(),
        body.chars().take(200).collect::<String>()
    );
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        GatewayError::retryable(message)
    } else {
        GatewayError::fatal(message)
    }
}

/// Sends a prepared request and returns the decoded JSON body of a 2xx response.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, GatewayError> {
    let resp = request.send().await.map_err(send_error)?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    resp.json::<serde_json::Value>()
        .await
        .map_err(|e| GatewayError::retryable(format!("unreadable gateway response: {e}")))
}

pub(crate) fn require_config(value: &str, what: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::fatal(format!("{what} is not configured")));
    }
    Ok(())
}

/// Normalizes a Nigerian mobile number to `+234XXXXXXXXXX`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = if digits.len() == 11 && digits.starts_with('0') {
        &digits[1..]
    } else if digits.len() == 13 && digits.starts_with("234") {
        &digits[3..]
    } else if digits.len() == 10 {
        &digits[..]
    } else {
        return None;
    };
    if !matches!(national.chars().next(), Some('7' | '8' | '9')) {
        return None;
    }
    Some(format!("+234{national}"))
}

pub(crate) fn json_str(v: &serde_json::Value, key: &str) -> Option<String> {
    match v.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn json_decimal(v: &serde_json::Value, key: &str) -> Option<Decimal> {
    match v.get(key)? {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub(crate) fn parse_body(raw_body: &[u8]) -> Result<serde_json::Value, SignatureError> {
    serde_json::from_slice(raw_body).map_err(|e| SignatureError::MalformedPayload(e.to_string()))
}
