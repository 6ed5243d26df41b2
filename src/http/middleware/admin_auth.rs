use crate::gateways::signature::verify_shared_secret;
use crate::http::errors::error_response;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

pub const INTERNAL_API_KEY_HEADER: &str = "X-Internal-Api-Key";

/// Guards the operator views of payments, attempts and the audit trail.
pub async fn require_internal_api_key(
    State(expected): State<String>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(INTERNAL_API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    if verify_shared_secret(&expected, provided).is_err() {
        return error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing or invalid internal api key");
    }

    next.run(request).await
}
