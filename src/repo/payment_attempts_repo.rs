use crate::domain::payment::{GatewayAttempt, GatewayKind};
use crate::repo::ports::AttemptStore;
use anyhow::Result;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PaymentAttemptsRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl AttemptStore for PaymentAttemptsRepo {
    async fn insert(&self, attempt: &GatewayAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_attempts (
                idempotency_reference, attempt_number, gateway, success, retryable, error,
                latency_ms, created_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            ON CONFLICT (idempotency_reference, attempt_number) DO NOTHING
            "#,
        )
        .bind(&attempt.idempotency_reference)
        .bind(attempt.attempt_number)
        .bind(attempt.gateway.as_str())
        .bind(attempt.success)
        .bind(attempt.retryable)
        .bind(&attempt.error)
        .bind(attempt.latency_ms)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_reference(&self, idempotency_reference: &str) -> Result<Vec<GatewayAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT idempotency_reference, attempt_number, gateway, success, retryable, error,
                   latency_ms, created_at
            FROM payment_attempts
            WHERE idempotency_reference = $1
            ORDER BY attempt_number ASC
            "#,
        )
        .bind(idempotency_reference)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<GatewayAttempt> {
                let gateway: String = row.try_get("gateway")?;
                Ok(GatewayAttempt {
                    idempotency_reference: row.try_get("idempotency_reference")?,
                    attempt_number: row.try_get("attempt_number")?,
                    gateway: gateway.parse::<GatewayKind>()?,
                    success: row.try_get("success")?,
                    retryable: row.try_get("retryable")?,
                    error: row.try_get("error")?,
                    latency_ms: row.try_get("latency_ms")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
