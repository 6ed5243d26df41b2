use crate::domain::checkout::CheckoutRequest;
use crate::domain::payment::GatewayKind;
use crate::domain::webhook::{ChargeOutcome, WebhookEvent};
use crate::error::{GatewayError, SignatureError};
use crate::gateways::signature::verify_sha512_hex;
use crate::gateways::{
    json_decimal, json_str, parse_body, require_config, send_json, GatewayCheckout,
    GatewayStatusReport, PaymentGateway,
};
use rust_decimal::Decimal;
use serde_json::json;

/// Card acquirer. Amounts travel in kobo in both directions.
pub struct PaystackGateway {
    pub base_url: String,
    pub secret_key: String,
    pub callback_url: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

#[async_trait::async_trait]
impl PaymentGateway for PaystackGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Paystack
    }

    fn signature_header(&self) -> &'static str {
        "x-paystack-signature"
    }

    async fn create_checkout(
        &self,
        req: &CheckoutRequest,
        reference: &str,
    ) -> Result<GatewayCheckout, GatewayError> {
        require_config(&self.secret_key, "paystack secret key")?;

        let body = json!({
            "email": req.customer.email,
            "amount": req.amount_minor,
            "currency": req.currency,
            "reference": reference,
            "callback_url": self.callback_url,
            "metadata": {
                "order_id": req.order_id,
                "customer_name": req.customer.name,
                "phone": req.customer.phone,
                "items": req.items_summary(),
                "delivery": req.delivery,
            }
        });

        let v = send_json(
            self.client
                .post(format!("{}/transaction/initialize", self.base_url))
                .bearer_auth(&self.secret_key)
                .json(&body)
                .timeout(std::time::Duration::from_millis(self.timeout_ms)),
        )
        .await?;

        if v.get("status").and_then(|s| s.as_bool()) != Some(true) {
            let message = json_str(&v, "message").unwrap_or_else(|| "initialization refused".to_string());
            return Err(GatewayError::fatal(message));
        }

        let data = v.get("data").cloned().unwrap_or_default();
        let payment_url = json_str(&data, "authorization_url")
            .ok_or_else(|| GatewayError::retryable("paystack response has no authorization_url"))?;

        Ok(GatewayCheckout {
            payment_url,
            gateway_reference: json_str(&data, "access_code"),
        })
    }

    fn verify_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError> {
        verify_sha512_hex(&self.secret_key, raw_body, signature)?;
        let v = parse_body(raw_body)?;

        let event_type = json_str(&v, "event").unwrap_or_default();
        let data = v.get("data").cloned().unwrap_or_default();
        let outcome = match event_type.as_str() {
            "charge.success" => ChargeOutcome::Succeeded,
            "charge.failed" => ChargeOutcome::AttemptFailed,
            _ => ChargeOutcome::Other,
        };

        Ok(WebhookEvent {
            gateway: GatewayKind::Paystack,
            event_type,
            reference: json_str(&data, "reference").unwrap_or_default(),
            gateway_reference: json_str(&data, "id"),
            amount: kobo_to_naira(json_decimal(&data, "amount")),
            currency: json_str(&data, "currency").unwrap_or_default().to_uppercase(),
            outcome,
            signature: signature.unwrap_or_default().to_string(),
            raw_body: v,
        })
    }

    async fn fetch_status(&self, reference: &str) -> Result<GatewayStatusReport, GatewayError> {
        require_config(&self.secret_key, "paystack secret key")?;

        let v = send_json(
            self.client
                .get(format!("{}/transaction/verify/{}", self.base_url, reference))
                .bearer_auth(&self.secret_key)
                .timeout(std::time::Duration::from_millis(self.timeout_ms)),
        )
        .await?;

        let data = v.get("data").cloned().unwrap_or_default();
        let outcome = match json_str(&data, "status").as_deref() {
            Some("success") => ChargeOutcome::Succeeded,
            Some("failed") => ChargeOutcome::AttemptFailed,
            Some("reversed") => ChargeOutcome::Closed,
            // abandoned: the customer left the page and can still come back and pay
            _ => ChargeOutcome::Other,
        };

        Ok(GatewayStatusReport {
            reference: reference.to_string(),
            gateway_reference: json_str(&data, "id"),
            amount: kobo_to_naira(json_decimal(&data, "amount")),
            currency: json_str(&data, "currency").unwrap_or_default().to_uppercase(),
            outcome,
            raw: v,
        })
    }
}

fn kobo_to_naira(amount: Option<Decimal>) -> Decimal {
    amount.map(|a| a / Decimal::ONE_HUNDRED).unwrap_or(Decimal::ZERO)
}
