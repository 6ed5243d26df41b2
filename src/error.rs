use crate::domain::payment::GatewayAttempt;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Failure of a single adapter call. Retryable errors are timeouts, connection
/// failures, 429 and 5xx; everything else is a caller or configuration problem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct GatewayError {
    pub retryable: bool,
    pub message: String,
}

impl GatewayError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("signature header is missing")]
    MissingSignature,
    #[error("signature does not match payload")]
    Mismatch,
    #[error("webhook payload is malformed: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "amount mismatch: gateway reported {claimed} {currency}, order total is {order_total}, payment record holds {payment_amount}, ratio {ratio}"
)]
pub struct AmountMismatchError {
    pub claimed: Decimal,
    pub currency: String,
    pub order_total: Decimal,
    pub payment_amount: Decimal,
    pub ratio: String,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("unknown gateway {0}")]
    UnknownGateway(String),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("payment {0} not found")]
    PaymentNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("invalid checkout: {0}")]
    Invalid(String),
    #[error("idempotency key reused with a different payload")]
    IdempotencyConflict,
    #[error("a checkout for this idempotency key is already running")]
    InProgress,
    #[error("no payment gateway is configured")]
    NoGateway,
    #[error("all gateways failed, last error: {last_error}")]
    OrchestrationExhausted {
        last_error: GatewayError,
        attempts: Vec<GatewayAttempt>,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
