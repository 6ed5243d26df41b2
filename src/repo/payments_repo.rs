use crate::domain::payment::{Completion, GatewayKind, PaymentRecord, PaymentStatus};
use crate::repo::outbox_repo::OutboxRepo;
use crate::repo::ports::{OrderSync, PaymentStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = r#"
    payment_id, order_id, idempotency_reference, request_hash, reference, amount, currency,
    gateway, gateway_reference, checkout_url, status, attempts, created_at, completed_at,
    failure_reason, gateway_response
"#;

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

fn map_row(r: &PgRow) -> Result<PaymentRecord> {
    let gateway: String = r.try_get("gateway")?;
    let status: String = r.try_get("status")?;
    Ok(PaymentRecord {
        id: r.try_get("payment_id")?,
        order_id: r.try_get("order_id")?,
        idempotency_reference: r.try_get("idempotency_reference")?,
        request_hash: r.try_get("request_hash")?,
        reference: r.try_get("reference")?,
        amount: r.try_get("amount")?,
        currency: r.try_get("currency")?,
        gateway: gateway.parse::<GatewayKind>()?,
        gateway_reference: r.try_get("gateway_reference")?,
        checkout_url: r.try_get("checkout_url")?,
        status: status.parse::<PaymentStatus>()?,
        attempts: r.try_get("attempts")?,
        created_at: r.try_get("created_at")?,
        completed_at: r.try_get("completed_at")?,
        failure_reason: r.try_get("failure_reason")?,
        gateway_response: r.try_get("gateway_response")?,
    })
}

#[async_trait::async_trait]
impl PaymentStore for PaymentsRepo {
    async fn find_by_idempotency(&self, idempotency_reference: &str) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE idempotency_reference = $1"
        ))
        .bind(idempotency_reference)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn insert_pending(&self, record: PaymentRecord) -> Result<(PaymentRecord, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, order_id, idempotency_reference, request_hash, reference, amount,
                currency, gateway, gateway_reference, checkout_url, status, attempts, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, 'PENDING', $11, $12
            )
            ON CONFLICT (idempotency_reference) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.order_id)
        .bind(&record.idempotency_reference)
        .bind(&record.request_hash)
        .bind(&record.reference)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.gateway.as_str())
        .bind(&record.gateway_reference)
        .bind(&record.checkout_url)
        .bind(record.attempts)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            return Ok((record, true));
        }

        let existing = self
            .find_by_idempotency(&record.idempotency_reference)
            .await?
            .ok_or_else(|| anyhow::anyhow!("idempotency conflict without a stored payment"))?;
        Ok((existing, false))
    }

    async fn get(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1"))
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn find_by_reference(
        &self,
        gateway: GatewayKind,
        reference: &str,
    ) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE gateway = $1 AND (reference = $2 OR gateway_reference = $2)
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(gateway.as_str())
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn complete_if_pending(
        &self,
        payment_id: Uuid,
        completion: &Completion,
        sync: &OrderSync,
    ) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'COMPLETED', amount = $2, completed_at = $3, gateway_response = $4,
                gateway_reference = COALESCE($5, gateway_reference), updated_at = now()
            WHERE payment_id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(payment_id)
        .bind(completion.amount)
        .bind(completion.completed_at)
        .bind(&completion.gateway_response)
        .bind(&completion.gateway_reference)
        .execute(tx.as_mut())
        .await?;

        if res.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        let task_id = OutboxRepo::insert_tx(&mut tx, payment_id, sync).await?;
        tx.commit().await?;
        Ok(Some(task_id))
    }

    async fn fail_if_pending(
        &self,
        payment_id: Uuid,
        reason: &str,
        gateway_response: Option<&serde_json::Value>,
        at: DateTime<Utc>,
        sync: &OrderSync,
    ) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'FAILED', failure_reason = $2, gateway_response = COALESCE($3, gateway_response),
                completed_at = $4, updated_at = now()
            WHERE payment_id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(payment_id)
        .bind(reason)
        .bind(gateway_response)
        .bind(at)
        .execute(tx.as_mut())
        .await?;

        if res.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        let task_id = OutboxRepo::insert_tx(&mut tx, payment_id, sync).await?;
        tx.commit().await?;
        Ok(Some(task_id))
    }

    async fn reserve_checkout(
        &self,
        idempotency_reference: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO checkout_reservations (idempotency_reference, reserved_at)
            VALUES ($1, now())
            ON CONFLICT (idempotency_reference) DO UPDATE SET reserved_at = now()
            WHERE checkout_reservations.reserved_at < $2
            "#,
        )
        .bind(idempotency_reference)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn release_checkout(&self, idempotency_reference: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkout_reservations WHERE idempotency_reference = $1")
            .bind(idempotency_reference)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE status = 'PENDING' AND created_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }
}
