use crate::domain::payment::{OrderStatus, PaymentStatus};
use crate::repo::ports::OrderStore;
use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Reads and updates the storefront's `orders` table. Settlement owns neither the
/// table nor its schema.
#[derive(Clone)]
pub struct OrdersRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl OrderStore for OrdersRepo {
    async fn order_total(&self, order_id: Uuid) -> Result<Option<Decimal>> {
        let row = sqlx::query("SELECT total_amount FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("total_amount")))
    }

    async fn set_payment_status(
        &self,
        order_id: Uuid,
        payment_status: PaymentStatus,
        order_status: Option<OrderStatus>,
    ) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2, status = COALESCE($3, status), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(payment_status.as_str())
        .bind(order_status.map(|s| s.as_str()))
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            anyhow::bail!("order {} not found", order_id);
        }
        Ok(())
    }
}
