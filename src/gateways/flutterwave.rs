use crate::domain::checkout::CheckoutRequest;
use crate::domain::payment::{minor_to_major, GatewayKind};
use crate::domain::webhook::{ChargeOutcome, WebhookEvent};
use crate::error::{GatewayError, SignatureError};
use crate::gateways::signature::verify_shared_secret;
use crate::gateways::{
    json_decimal, json_str, normalize_phone, parse_body, require_config, send_json,
    GatewayCheckout, GatewayStatusReport, PaymentGateway,
};
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;

/// Card and USSD acquirer. Amounts are naira in both directions.
pub struct FlutterwaveGateway {
    pub base_url: String,
    pub secret_key: String,
    pub webhook_hash: String,
    pub callback_url: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

#[async_trait::async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Flutterwave
    }

    fn signature_header(&self) -> &'static str {
        "verif-hash"
    }

    async fn create_checkout(
        &self,
        req: &CheckoutRequest,
        reference: &str,
    ) -> Result<GatewayCheckout, GatewayError> {
        require_config(&self.secret_key, "flutterwave secret key")?;
        let phone = normalize_phone(&req.customer.phone)
            .ok_or_else(|| GatewayError::fatal("invalid customer phone number"))?;
        let amount = minor_to_major(req.amount_minor)
            .to_f64()
            .ok_or_else(|| GatewayError::fatal("amount is not representable"))?;

        let body = json!({
            "tx_ref": reference,
            "amount": amount,
            "currency": req.currency,
            "redirect_url": self.callback_url,
            "payment_options": "card,ussd,banktransfer",
            "customer": {
                "email": req.customer.email,
                "phonenumber": phone,
                "name": req.customer.name,
            },
            "customizations": {
                "title": "Pharmacy order",
                "description": req.items_summary(),
            },
            "meta": {
                "order_id": req.order_id,
                "delivery_address": req.delivery.as_ref().and_then(|d| d.address.clone()),
            }
        });

        let v = send_json(
            self.client
                .post(format!("{}/v3/payments", self.base_url))
                .bearer_auth(&self.secret_key)
                .json(&body)
                .timeout(std::time::Duration::from_millis(self.timeout_ms)),
        )
        .await?;

        if json_str(&v, "status").as_deref() != Some("success") {
            let message = json_str(&v, "message").unwrap_or_else(|| "payment link refused".to_string());
            return Err(GatewayError::fatal(message));
        }

        let data = v.get("data").cloned().unwrap_or_default();
        let payment_url = json_str(&data, "link")
            .ok_or_else(|| GatewayError::retryable("flutterwave response has no link"))?;

        Ok(GatewayCheckout {
            payment_url,
            gateway_reference: None,
        })
    }

    fn verify_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError> {
        verify_shared_secret(&self.webhook_hash, signature)?;
        let v = parse_body(raw_body)?;

        let event_type = json_str(&v, "event").unwrap_or_default();
        let data = v.get("data").cloned().unwrap_or_default();
        let outcome = match (event_type.as_str(), json_str(&data, "status").as_deref()) {
            ("charge.completed", Some("successful")) => ChargeOutcome::Succeeded,
            ("charge.completed", Some("failed")) => ChargeOutcome::AttemptFailed,
            _ => ChargeOutcome::Other,
        };

        Ok(WebhookEvent {
            gateway: GatewayKind::Flutterwave,
            event_type,
            reference: json_str(&data, "tx_ref").unwrap_or_default(),
            gateway_reference: json_str(&data, "id"),
            amount: json_decimal(&data, "amount").unwrap_or_default(),
            currency: json_str(&data, "currency").unwrap_or_default().to_uppercase(),
            outcome,
            signature: signature.unwrap_or_default().to_string(),
            raw_body: v,
        })
    }

    async fn fetch_status(&self, reference: &str) -> Result<GatewayStatusReport, GatewayError> {
        require_config(&self.secret_key, "flutterwave secret key")?;

        let v = send_json(
            self.client
                .get(format!("{}/v3/transactions/verify_by_reference", self.base_url))
                .query(&[("tx_ref", reference)])
                .bearer_auth(&self.secret_key)
                .timeout(std::time::Duration::from_millis(self.timeout_ms)),
        )
        .await?;

        let data = v.get("data").cloned().unwrap_or_default();
        let outcome = match json_str(&data, "status").as_deref() {
            Some("successful") => ChargeOutcome::Succeeded,
            Some("failed") => ChargeOutcome::AttemptFailed,
            Some("cancelled") => ChargeOutcome::Closed,
            _ => ChargeOutcome::Other,
        };

        Ok(GatewayStatusReport {
            reference: reference.to_string(),
            gateway_reference: json_str(&data, "id"),
            amount: json_decimal(&data, "amount").unwrap_or_default(),
            currency: json_str(&data, "currency").unwrap_or_default().to_uppercase(),
            outcome,
            raw: v,
        })
    }
}
