use crate::domain::checkout::{build_checkout, CheckoutFailure, CreateCheckoutRequest};
use crate::error::CheckoutError;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

const CHECKOUT_FAILED: &str = "checkout could not be created";

fn failure(status: StatusCode, code: &str, error: &str) -> Response {
    (
        status,
        Json(CheckoutFailure {
            success: false,
            code: code.to_string(),
            error: error.to_string(),
        }),
    )
        .into_response()
}

pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, "INVALID_REQUEST", &e.body_text()),
    };
    let header_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let (req, preferred) = build_checkout(body, header_key);

    // Runs detached so a dropped client connection cannot cancel in-flight gateway calls.
    let orchestrator = state.checkout.clone();
    let task = tokio::spawn(async move { orchestrator.checkout(req, preferred).await });

    match task.await {
        Ok(Ok(result)) => (StatusCode::OK, Json(result.to_response())).into_response(),
        Ok(Err(e)) => checkout_error(e),
        Err(e) => {
            tracing::error!("checkout task aborted: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", CHECKOUT_FAILED)
        }
    }
}

fn checkout_error(e: CheckoutError) -> Response {
    match e {
        CheckoutError::Invalid(msg) => failure(StatusCode::BAD_REQUEST, "INVALID_REQUEST", &msg),
        CheckoutError::IdempotencyConflict => failure(
            StatusCode::CONFLICT,
            "IDEMPOTENCY_CONFLICT",
            "idempotency key was already used with a different request",
        ),
        CheckoutError::InProgress => failure(
            StatusCode::CONFLICT,
            "CHECKOUT_IN_PROGRESS",
            "a checkout with this idempotency key is still being created",
        ),
        CheckoutError::NoGateway | CheckoutError::OrchestrationExhausted { .. } => {
            failure(StatusCode::BAD_GATEWAY, "GATEWAY_UNAVAILABLE", CHECKOUT_FAILED)
        }
        CheckoutError::Store(e) => {
            tracing::error!("checkout store error: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", CHECKOUT_FAILED)
        }
    }
}
