use crate::http::handlers::{checkout, payments, webhooks};
use crate::http::middleware::admin_auth::require_internal_api_key;
use crate::AppState;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

/// Full application router without the rate limit layer, which `main` adds on top.
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/payments/:payment_id", get(payments::get_payment))
        .route("/payments/:payment_id/audit", get(payments::get_audit_trail))
        .route("/checkout/:reference/attempts", get(payments::list_attempts))
        .layer(from_fn_with_state(
            state.internal_api_key.clone(),
            require_internal_api_key,
        ));

    Router::new()
        .route("/health", get(payments::health))
        .route("/checkout", post(checkout::create_checkout))
        .route("/webhooks/payments/:gateway", post(webhooks::receive_webhook))
        .merge(admin_routes)
        .with_state(state)
}
