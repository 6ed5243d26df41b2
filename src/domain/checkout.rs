use crate::domain::payment::{GatewayKind, PaymentRecord};
use crate::error::CheckoutError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub email: String,
    pub phone: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price_minor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DeliveryInfo {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub notes: Option<String>,
}

/// Body of `POST /checkout`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateCheckoutRequest {
    pub order_id: Uuid,
    #[serde(alias = "totalAmount", alias = "total_amount")]
    pub amount_minor: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub customer: Customer,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub delivery: Option<DeliveryInfo>,
    #[serde(default)]
    pub preferred_gateway: Option<GatewayKind>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn default_currency() -> String {
    "NGN".to_string()
}

/// Canonical, immutable checkout passed to every gateway adapter.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckoutRequest {
    pub order_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub customer: Customer,
    pub items: Vec<LineItem>,
    pub delivery: Option<DeliveryInfo>,
    pub idempotency_reference: String,
}

impl CheckoutRequest {
    pub fn items_summary(&self) -> String {
        let summary = self
            .items
            .iter()
            .map(|i| format!("{}x {}", i.quantity, i.name))
            .collect::<Vec<_>>()
            .join(", ");
        if summary.is_empty() {
            return format!("Order {}", self.order_id);
        }
        summary.chars().take(200).collect()
    }
}

/// Builds the canonical request. The header key wins over the body key; absent both, a
/// fresh reference is generated so the call is still recorded under a stable key.
pub fn build_checkout(
    body: CreateCheckoutRequest,
    header_key: Option<String>,
) -> (CheckoutRequest, Option<GatewayKind>) {
    let idempotency_reference = header_key
        .or(body.idempotency_key)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| format!("chk_{}", Uuid::new_v4().simple()));

    let req = CheckoutRequest {
        order_id: body.order_id,
        amount_minor: body.amount_minor,
        currency: body.currency.trim().to_uppercase(),
        customer: body.customer,
        items: body.items,
        delivery: body.delivery,
        idempotency_reference,
    };
    (req, body.preferred_gateway)
}

pub fn validate_checkout(req: &CheckoutRequest) -> Result<(), CheckoutError> {
    if req.amount_minor <= 0 {
        return Err(CheckoutError::Invalid("amount must be > 0".to_string()));
    }
    if req.currency.len() != 3 || !req.currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(CheckoutError::Invalid("currency must be an ISO 4217 code".to_string()));
    }
    if !req.customer.email.contains('@') {
        return Err(CheckoutError::Invalid("customer email is invalid".to_string()));
    }
    if req.customer.name.trim().is_empty() {
        return Err(CheckoutError::Invalid("customer name is required".to_string()));
    }
    if req.items.iter().any(|i| i.quantity == 0 || i.unit_price_minor < 0) {
        return Err(CheckoutError::Invalid("line items must have a positive quantity".to_string()));
    }
    Ok(())
}

/// Stable fingerprint of the payload, used to detect idempotency key reuse.
pub fn request_hash(req: &CheckoutRequest) -> String {
    let s = serde_json::to_string(req).unwrap_or_default();
    hex::encode(Sha256::digest(s.as_bytes()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub checkout_link: Option<String>,
    pub reference: String,
    pub gateway: GatewayKind,
    pub payment_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutFailure {
    pub success: bool,
    pub code: String,
    pub error: String,
}

/// Result of one orchestration. `reused` is set when an earlier call with the same
/// idempotency reference already produced the record.
#[derive(Debug, Clone)]
pub struct PaymentInitResult {
    pub record: PaymentRecord,
    pub reused: bool,
}

impl PaymentInitResult {
    pub fn to_response(&self) -> CheckoutResponse {
        CheckoutResponse {
            success: true,
            checkout_link: self.record.checkout_url.clone(),
            reference: self.record.reference.clone(),
            gateway: self.record.gateway,
            payment_id: self.record.id,
        }
    }
}
