use crate::repo::ports::{OrderStore, OrderSyncQueue};
use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// Seconds until the next try after `attempts` failures.
pub fn backoff_seconds(attempts: i32) -> i64 {
    i64::min(300, 2_i64.pow(attempts.clamp(0, 9) as u32))
}

#[derive(Clone)]
pub struct OrderSyncRelay {
    pub queue: Arc<dyn OrderSyncQueue>,
    pub orders: Arc<dyn OrderStore>,
    pub batch_size: i64,
    pub poll_interval: std::time::Duration,
}

impl OrderSyncRelay {
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if let Err(err) = self.tick().await {
                tracing::error!("order sync relay error: {}", err);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {
                    tracing::info!("order sync relay stopping");
                    return;
                }
            }
        }
    }

    /// Applies one batch of due order updates. Returns how many were applied. A failed
    /// mark leaves its row claimed until the lease runs out; the rest of the batch still runs.
    pub async fn tick(&self) -> Result<usize> {
        let batch = self.queue.claim_due(self.batch_size).await?;
        let mut applied = 0;

        for task in batch {
            match self
                .orders
                .set_payment_status(task.order_id, task.payment_status, task.order_status)
                .await
            {
                Ok(()) => {
                    applied += 1;
                    if let Err(e) = self.queue.mark_done(task.id).await {
                        tracing::warn!(
                            payment_id = %task.payment_id,
                            task_id = task.id,
                            "order update applied but not marked done: {}",
                            e
                        );
                        continue;
                    }
                    tracing::info!(
                        payment_id = %task.payment_id,
                        order_id = %task.order_id,
                        attempts = task.attempts + 1,
                        "queued order update applied"
                    );
                }
                Err(e) => {
                    let attempts = task.attempts + 1;
                    tracing::warn!(
                        payment_id = %task.payment_id,
                        order_id = %task.order_id,
                        attempts,
                        "order update retry failed: {}",
                        e
                    );
                    let next_attempt_at = Utc::now() + Duration::seconds(backoff_seconds(attempts));
                    if let Err(e) = self.queue.mark_retry(task.id, attempts, next_attempt_at).await {
                        tracing::warn!(
                            payment_id = %task.payment_id,
                            task_id = task.id,
                            "could not reschedule order update: {}",
                            e
                        );
                    }
                }
            }
        }

        Ok(applied)
    }
}
