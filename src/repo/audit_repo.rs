use crate::domain::audit::{AuditDecision, AuditEntry};
use crate::repo::ports::AuditStore;
use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct AuditRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl AuditStore for AuditRepo {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settlement_audit_log (
                payment_id, payment_amount, order_amount, gateway_amount, mismatch_ratio,
                decision, reason, created_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            "#,
        )
        .bind(entry.payment_id)
        .bind(entry.payment_amount)
        .bind(entry.order_amount)
        .bind(entry.gateway_amount)
        .bind(entry.mismatch_ratio)
        .bind(entry.decision.as_str())
        .bind(&entry.reason)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_payment(&self, payment_id: Uuid) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT payment_id, payment_amount, order_amount, gateway_amount, mismatch_ratio,
                   decision, reason, created_at
            FROM settlement_audit_log
            WHERE payment_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<AuditEntry> {
                let decision: String = row.try_get("decision")?;
                Ok(AuditEntry {
                    payment_id: row.try_get("payment_id")?,
                    payment_amount: row.try_get("payment_amount")?,
                    order_amount: row.try_get("order_amount")?,
                    gateway_amount: row.try_get("gateway_amount")?,
                    mismatch_ratio: row.try_get("mismatch_ratio")?,
                    decision: decision.parse::<AuditDecision>()?,
                    reason: row.try_get("reason")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
