use crate::http::errors::{error_response, internal};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn get_payment(State(state): State<AppState>, Path(payment_id): Path<Uuid>) -> Response {
    match state.payments.get(payment_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "payment not found"),
        Err(e) => internal(e),
    }
}

pub async fn get_audit_trail(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Response {
    match state.audit.list_for_payment(payment_id).await {
        Ok(entries) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "payment_id": payment_id,
                "entries": entries
            })),
        )
            .into_response(),
        Err(e) => internal(e),
    }
}

pub async fn list_attempts(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Response {
    let attempts = match state.attempts.list_by_reference(&reference).await {
        Ok(v) => v,
        Err(e) => return internal(e),
    };

    let failed = attempts.iter().filter(|a| !a.success).count();
    let total_latency_ms: i32 = attempts.iter().map(|a| a.latency_ms).sum();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "idempotency_reference": reference,
            "total_attempts": attempts.len(),
            "failed_attempts": failed,
            "total_latency_ms": total_latency_ms,
            "attempts": attempts
        })),
    )
        .into_response()
}
