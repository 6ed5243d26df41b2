use crate::domain::payment::{OrderStatus, PaymentStatus};
use crate::repo::ports::{
    OrderSync, OrderSyncQueue, OrderSyncTask, INLINE_SYNC_GRACE_SECS, ORDER_SYNC_LEASE_SECS,
};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Clone)]
pub struct OutboxRepo {
    pub pool: PgPool,
}

impl OutboxRepo {
    /// Queues the order update inside the payment transition's transaction. The row is
    /// due after the inline grace, so the relay only picks it up if the inline try is lost.
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Postgres>,
        payment_id: Uuid,
        sync: &OrderSync,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_sync_outbox (payment_id, order_id, payment_status, order_status, status, attempts, next_attempt_at)
            VALUES ($1, $2, $3, $4, 'PENDING', 0, $5)
            ON CONFLICT (payment_id) DO UPDATE SET updated_at = now()
            RETURNING id
            "#,
        )
        .bind(payment_id)
        .bind(sync.order_id)
        .bind(sync.payment_status.as_str())
        .bind(sync.order_status.map(|s| s.as_str()))
        .bind(Utc::now() + Duration::seconds(INLINE_SYNC_GRACE_SECS))
        .fetch_one(tx.as_mut())
        .await?;

        Ok(row.try_get("id")?)
    }
}

#[async_trait::async_trait]
impl OrderSyncQueue for OutboxRepo {
    async fn claim_due(&self, batch_size: i64) -> Result<Vec<OrderSyncTask>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, order_id, payment_status, order_status, attempts
            FROM order_sync_outbox
            WHERE (status = 'PENDING' AND next_attempt_at <= now())
               OR (status = 'PROCESSING' AND updated_at < $2)
            ORDER BY id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(batch_size)
        .bind(Utc::now() - Duration::seconds(ORDER_SYNC_LEASE_SECS))
        .fetch_all(tx.as_mut())
        .await?;

        if rows.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();
        sqlx::query("UPDATE order_sync_outbox SET status = 'PROCESSING', updated_at = now() WHERE id = ANY($1)")
            .bind(&ids)
            .execute(tx.as_mut())
            .await?;

        tx.commit().await?;

        rows.into_iter()
            .map(|r| -> Result<OrderSyncTask> {
                let payment_status: String = r.try_get("payment_status")?;
                let order_status: Option<String> = r.try_get("order_status")?;
                Ok(OrderSyncTask {
                    id: r.try_get("id")?,
                    payment_id: r.try_get("payment_id")?,
                    order_id: r.try_get("order_id")?,
                    payment_status: payment_status.parse::<PaymentStatus>()?,
                    order_status: order_status.map(|s| s.parse::<OrderStatus>()).transpose()?,
                    attempts: r.try_get("attempts")?,
                })
            })
            .collect()
    }

    async fn mark_done(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE order_sync_outbox SET status='DONE', applied_at=now(), updated_at=now() WHERE id=$1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_retry(&self, id: i64, attempts: i32, next_attempt_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE order_sync_outbox SET status='PENDING', attempts=$2, next_attempt_at=$3, updated_at=now() WHERE id=$1",
        )
        .bind(id)
        .bind(attempts)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
