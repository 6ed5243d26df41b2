use crate::domain::payment::GatewayKind;
use crate::domain::webhook::WebhookOutcome;
use crate::error::{SettlementError, SignatureError};
use crate::http::errors::error_response;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

const VERIFY_FAILED: &str = "payment could not be verified";

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let kind = match gateway.parse::<GatewayKind>() {
        Ok(kind) => kind,
        Err(e) => return error_response(StatusCode::NOT_FOUND, "UNKNOWN_GATEWAY", &e.to_string()),
    };
    let signature = headers
        .get(state.webhooks.gateways.adapter(kind).signature_header())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let processor = state.webhooks.clone();
    let task = tokio::spawn(async move {
        processor.handle(kind, &body, signature.as_deref()).await
    });

    match task.await {
        Ok(Ok(outcome)) => (
            StatusCode::OK,
            Json(serde_json::json!({"received": true, "outcome": outcome})),
        )
            .into_response(),
        Ok(Err(SettlementError::Signature(SignatureError::MalformedPayload(msg)))) => {
            tracing::warn!(gateway = %kind, "signed webhook could not be parsed, ignoring: {}", msg);
            (
                StatusCode::OK,
                Json(serde_json::json!({"received": true, "outcome": WebhookOutcome::Ignored})),
            )
                .into_response()
        }
        Ok(Err(SettlementError::Signature(e))) => {
            error_response(StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE", &e.to_string())
        }
        Ok(Err(SettlementError::UnknownGateway(g))) => error_response(
            StatusCode::NOT_FOUND,
            "UNKNOWN_GATEWAY",
            &format!("unknown gateway {g}"),
        ),
        Ok(Err(e)) => {
            tracing::error!(gateway = %kind, "webhook processing failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", VERIFY_FAILED)
        }
        Err(e) => {
            tracing::error!(gateway = %kind, "webhook task aborted: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", VERIFY_FAILED)
        }
    }
}
