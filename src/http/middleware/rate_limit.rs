use crate::http::errors::error_response;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;

#[derive(Clone)]
pub struct RateLimitState {
    pub redis_client: redis::Client,
    pub max_per_minute: i64,
}

pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// One counter per client, path prefix and wall-clock minute.
pub fn window_key(ip: &str, path: &str, now: DateTime<Utc>) -> String {
    let scope = path.trim_start_matches('/').split('/').next().unwrap_or("");
    format!("settlement:rate:{}:{}:{}", scope, ip, now.format("%Y%m%d%H%M"))
}

/// Fixed-window limit. Redis being down lets traffic through.
pub async fn enforce(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = window_key(&client_ip(request.headers()), request.uri().path(), Utc::now());

    match state.redis_client.get_multiplexed_async_connection().await {
        Ok(mut conn) => {
            let count: i64 = conn.incr(&key, 1).await.unwrap_or(1);
            let _: bool = conn.expire(&key, 120).await.unwrap_or(false);
            if count > state.max_per_minute {
                tracing::warn!(key = %key, count, "rate limit exceeded");
                return error_response(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "rate limit exceeded");
            }
        }
        Err(e) => tracing::debug!("rate limit skipped, redis unavailable: {}", e),
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_is_scoped_by_first_path_segment_and_minute() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 42, 7).unwrap();
        assert_eq!(
            window_key("10.0.0.1", "/webhooks/payments/paystack", now),
            "settlement:rate:webhooks:10.0.0.1:202405011042"
        );
    }

    #[test]
    fn first_forwarded_address_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "41.58.1.2, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "41.58.1.2");
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }
}
