use crate::domain::checkout::CheckoutRequest;
use crate::domain::payment::{minor_to_major, GatewayKind};
use crate::domain::webhook::{ChargeOutcome, WebhookEvent};
use crate::error::{GatewayError, SignatureError};
use crate::gateways::signature::verify_sha512_hex;
use crate::gateways::{
    json_decimal, json_str, parse_body, require_config, send_json, GatewayCheckout,
    GatewayStatusReport, PaymentGateway,
};
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;

/// Bank-transfer acquirer. Amounts are naira; every call needs a short-lived bearer
/// token obtained with the API key pair.
pub struct MonnifyGateway {
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub contract_code: String,
    pub callback_url: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl MonnifyGateway {
    async fn access_token(&self) -> Result<String, GatewayError> {
        require_config(&self.api_key, "monnify api key")?;
        require_config(&self.secret_key, "monnify secret key")?;

        let v = send_json(
            self.client
                .post(format!("{}/api/v1/auth/login", self.base_url))
                .basic_auth(&self.api_key, Some(&self.secret_key))
                .timeout(std::time::Duration::from_millis(self.timeout_ms)),
        )
        .await?;

        v.get("responseBody")
            .and_then(|b| json_str(b, "accessToken"))
            .ok_or_else(|| GatewayError::fatal("monnify login returned no access token"))
    }
}

fn ensure_successful(v: &serde_json::Value) -> Result<serde_json::Value, GatewayError> {
    if v.get("requestSuccessful").and_then(|s| s.as_bool()) != Some(true) {
        let message =
            json_str(v, "responseMessage").unwrap_or_else(|| "request was not successful".to_string());
        return Err(GatewayError::fatal(message));
    }
    Ok(v.get("responseBody").cloned().unwrap_or_default())
}

#[async_trait::async_trait]
impl PaymentGateway for MonnifyGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Monnify
    }

    fn signature_header(&self) -> &'static str {
        "monnify-signature"
    }

    async fn create_checkout(
        &self,
        req: &CheckoutRequest,
        reference: &str,
    ) -> Result<GatewayCheckout, GatewayError> {
        require_config(&self.contract_code, "monnify contract code")?;
        let token = self.access_token().await?;
        let amount = minor_to_major(req.amount_minor)
            .to_f64()
            .ok_or_else(|| GatewayError::fatal("amount is not representable"))?;

        let body = json!({
            "amount": amount,
            "customerName": req.customer.name,
            "customerEmail": req.customer.email,
            "paymentReference": reference,
            "paymentDescription": req.items_summary(),
            "currencyCode": req.currency,
            "contractCode": self.contract_code,
            "redirectUrl": self.callback_url,
            "paymentMethods": ["ACCOUNT_TRANSFER", "USSD", "CARD"],
            "metaData": {
                "orderId": req.order_id,
                "phone": req.customer.phone,
            }
        });

        let v = send_json(
            self.client
                .post(format!("{}/api/v1/merchant/transactions/init-transaction", self.base_url))
                .bearer_auth(token)
                .json(&body)
                .timeout(std::time::Duration::from_millis(self.timeout_ms)),
        )
        .await?;
        let data = ensure_successful(&v)?;

        let payment_url = json_str(&data, "checkoutUrl")
            .ok_or_else(|| GatewayError::retryable("monnify response has no checkoutUrl"))?;

        Ok(GatewayCheckout {
            payment_url,
            gateway_reference: json_str(&data, "transactionReference"),
        })
    }

    fn verify_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError> {
        verify_sha512_hex(&self.secret_key, raw_body, signature)?;
        let v = parse_body(raw_body)?;

        let event_type = json_str(&v, "eventType").unwrap_or_default();
        let data = v.get("eventData").cloned().unwrap_or_default();
        let outcome = match (event_type.as_str(), json_str(&data, "paymentStatus").as_deref()) {
            ("SUCCESSFUL_TRANSACTION", Some("PAID")) | ("SUCCESSFUL_TRANSACTION", None) => {
                ChargeOutcome::Succeeded
            }
            (_, Some("EXPIRED")) | (_, Some("CANCELLED")) | (_, Some("REVERSED")) => ChargeOutcome::Closed,
            ("FAILED_TRANSACTION", _) | (_, Some("FAILED")) => ChargeOutcome::AttemptFailed,
            _ => ChargeOutcome::Other,
        };

        Ok(WebhookEvent {
            gateway: GatewayKind::Monnify,
            event_type,
            reference: json_str(&data, "paymentReference").unwrap_or_default(),
            gateway_reference: json_str(&data, "transactionReference"),
            amount: json_decimal(&data, "amountPaid").unwrap_or_default(),
            currency: json_str(&data, "currency")
                .or_else(|| json_str(&data, "currencyCode"))
                .unwrap_or_default()
                .to_uppercase(),
            outcome,
            signature: signature.unwrap_or_default().to_string(),
            raw_body: v,
        })
    }

    async fn fetch_status(&self, reference: &str) -> Result<GatewayStatusReport, GatewayError> {
        let token = self.access_token().await?;

        let v = send_json(
            self.client
                .get(format!("{}/api/v2/merchant/transactions/query", self.base_url))
                .query(&[("paymentReference", reference)])
                .bearer_auth(token)
                .timeout(std::time::Duration::from_millis(self.timeout_ms)),
        )
        .await?;
        let data = ensure_successful(&v)?;

        let outcome = match json_str(&data, "paymentStatus").as_deref() {
            Some("PAID") | Some("OVERPAID") => ChargeOutcome::Succeeded,
            Some("FAILED") => ChargeOutcome::AttemptFailed,
            Some("EXPIRED") | Some("CANCELLED") | Some("REVERSED") => ChargeOutcome::Closed,
            _ => ChargeOutcome::Other,
        };

        Ok(GatewayStatusReport {
            reference: reference.to_string(),
            gateway_reference: json_str(&data, "transactionReference"),
            amount: json_decimal(&data, "amountPaid").unwrap_or_default(),
            currency: json_str(&data, "currencyCode").unwrap_or_default().to_uppercase(),
            outcome,
            raw: v,
        })
    }
}
