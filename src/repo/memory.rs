//! In-process implementations of the store ports.
//!
//! They back the test suite and local runs without Postgres. Each store is a cheap
//! `Clone` handle over shared state, so a test can keep a handle for assertions while
//! the services own another.

use crate::domain::audit::AuditEntry;
use crate::domain::payment::{
    Completion, GatewayAttempt, GatewayKind, OrderStatus, PaymentRecord, PaymentStatus,
};
use crate::repo::ports::{
    AttemptStore, AuditStore, OrderStore, OrderSync, OrderSyncQueue, OrderSyncTask, PaymentStore,
    INLINE_SYNC_GRACE_SECS, ORDER_SYNC_LEASE_SECS,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Payment store whose transitions write into a shared order-sync queue, mirroring the
/// single transaction the Postgres store uses.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<Uuid, PaymentRecord>>>,
    reservations: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
    order_sync: InMemoryOrderSyncQueue,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order_sync(order_sync: InMemoryOrderSyncQueue) -> Self {
        Self {
            order_sync,
            ..Self::default()
        }
    }

    pub async fn all(&self) -> Vec<PaymentRecord> {
        self.payments.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find_by_idempotency(&self, idempotency_reference: &str) -> Result<Option<PaymentRecord>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| p.idempotency_reference == idempotency_reference)
            .cloned())
    }

    async fn insert_pending(&self, record: PaymentRecord) -> Result<(PaymentRecord, bool)> {
        let mut payments = self.payments.write().await;
        if let Some(existing) = payments
            .values()
            .find(|p| p.idempotency_reference == record.idempotency_reference)
        {
            return Ok((existing.clone(), false));
        }
        let mut record = record;
        record.status = PaymentStatus::Pending;
        payments.insert(record.id, record.clone());
        Ok((record, true))
    }

    async fn get(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>> {
        Ok(self.payments.read().await.get(&payment_id).cloned())
    }

    async fn find_by_reference(
        &self,
        gateway: GatewayKind,
        reference: &str,
    ) -> Result<Option<PaymentRecord>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .filter(|p| p.gateway == gateway)
            .find(|p| p.reference == reference || p.gateway_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn complete_if_pending(
        &self,
        payment_id: Uuid,
        completion: &Completion,
        sync: &OrderSync,
    ) -> Result<Option<i64>> {
        let mut payments = self.payments.write().await;
        let Some(record) = payments.get_mut(&payment_id) else {
            return Ok(None);
        };
        if record.status != PaymentStatus::Pending {
            return Ok(None);
        }
        let task_id = self.order_sync.push(payment_id, sync).await?;
        record.status = PaymentStatus::Completed;
        record.amount = completion.amount;
        record.completed_at = Some(completion.completed_at);
        record.gateway_response = Some(completion.gateway_response.clone());
        if completion.gateway_reference.is_some() {
            record.gateway_reference = completion.gateway_reference.clone();
        }
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
        let mut payments = self.payments.write().await;
        let Some(record) = payments.get_mut(&payment_id) else {
            return Ok(None);
        };
        if record.status != PaymentStatus::Pending {
            return Ok(None);
        }
        let task_id = self.order_sync.push(payment_id, sync).await?;
        record.status = PaymentStatus::Failed;
        record.failure_reason = Some(reason.to_string());
        record.completed_at = Some(at);
        if let Some(raw) = gateway_response {
            record.gateway_response = Some(raw.clone());
        }
        Ok(Some(task_id))
    }

    async fn reserve_checkout(
        &self,
        idempotency_reference: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let mut reservations = self.reservations.write().await;
        match reservations.get(idempotency_reference) {
            Some(reserved_at) if *reserved_at >= stale_before => Ok(false),
            _ => {
                reservations.insert(idempotency_reference.to_string(), Utc::now());
                Ok(true)
            }
        }
    }

    async fn release_checkout(&self, idempotency_reference: &str) -> Result<()> {
        self.reservations.write().await.remove(idempotency_reference);
        Ok(())
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<PaymentRecord>> {
        let payments = self.payments.read().await;
        let mut out: Vec<PaymentRecord> = payments
            .values()
            .filter(|p| p.status == PaymentStatus::Pending && p.created_at <= cutoff)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.created_at);
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAttemptStore {
    attempts: Arc<RwLock<Vec<GatewayAttempt>>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn insert(&self, attempt: &GatewayAttempt) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        let duplicate = attempts.iter().any(|a| {
            a.idempotency_reference == attempt.idempotency_reference
                && a.attempt_number == attempt.attempt_number
        });
        if !duplicate {
            attempts.push(attempt.clone());
        }
        Ok(())
    }

    async fn list_by_reference(&self, idempotency_reference: &str) -> Result<Vec<GatewayAttempt>> {
        let attempts = self.attempts.read().await;
        let mut out: Vec<GatewayAttempt> = attempts
            .iter()
            .filter(|a| a.idempotency_reference == idempotency_reference)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.attempt_number);
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub total: Decimal,
    pub payment_status: Option<PaymentStatus>,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_status: Option<OrderStatus>,
}

/// Order store with failure injection for exercising the order-sync outbox.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, OrderRow>>>,
    updates: Arc<RwLock<Vec<OrderUpdate>>>,
    failures_left: Arc<AtomicUsize>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order_id: Uuid, total: Decimal) {
        self.orders.write().await.insert(
            order_id,
            OrderRow {
                total,
                payment_status: None,
                status: OrderStatus::Pending,
            },
        );
    }

    pub async fn order(&self, order_id: Uuid) -> Option<OrderRow> {
        self.orders.read().await.get(&order_id).cloned()
    }

    /// Applied updates, in order.
    pub async fn updates(&self) -> Vec<OrderUpdate> {
        self.updates.read().await.clone()
    }

    /// Makes the next `n` status updates fail.
    pub fn fail_next_updates(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn order_total(&self, order_id: Uuid) -> Result<Option<Decimal>> {
        Ok(self.orders.read().await.get(&order_id).map(|o| o.total))
    }

    async fn set_payment_status(
        &self,
        order_id: Uuid,
        payment_status: PaymentStatus,
        order_status: Option<OrderStatus>,
    ) -> Result<()> {
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            anyhow::bail!("order store unavailable");
        }

        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| anyhow::anyhow!("order {} not found", order_id))?;
        order.payment_status = Some(payment_status);
        if let Some(status) = order_status {
            order.status = status;
        }
        self.updates.write().await.push(OrderUpdate {
            order_id,
            payment_status,
            order_status,
        });
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAuditStore {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("audit store unavailable");
        }
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_for_payment(&self, payment_id: Uuid) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| e.payment_id == payment_id).cloned().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Processing,
    Done,
}

#[derive(Debug, Clone)]
struct QueuedTask {
    task: OrderSyncTask,
    state: TaskState,
    next_attempt_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default, Clone)]
pub struct InMemoryOrderSyncQueue {
    tasks: Arc<RwLock<Vec<QueuedTask>>>,
    next_id: Arc<AtomicI64>,
    failing: Arc<AtomicBool>,
    mark_failures_left: Arc<AtomicUsize>,
}

impl InMemoryOrderSyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks not yet marked done.
    pub async fn pending(&self) -> Vec<OrderSyncTask> {
        let tasks = self.tasks.read().await;
        tasks
            .iter()
            .filter(|t| t.state != TaskState::Done)
            .map(|t| t.task.clone())
            .collect()
    }

    /// Pulls every scheduled retry forward to now.
    pub async fn make_all_due(&self) {
        let now = Utc::now();
        for t in self.tasks.write().await.iter_mut() {
            t.next_attempt_at = now;
        }
    }

    /// Ages every claim past its lease, as if the relay holding it had died.
    pub async fn expire_leases(&self) {
        let expired = Utc::now() - Duration::seconds(ORDER_SYNC_LEASE_SECS + 1);
        for t in self.tasks.write().await.iter_mut() {
            if t.state == TaskState::Processing {
                t.updated_at = expired;
            }
        }
    }

    /// Makes every queue operation fail, including writes made by payment transitions.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next `n` calls to `mark_done` or `mark_retry` fail.
    pub fn fail_next_marks(&self, n: usize) {
        self.mark_failures_left.store(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("order sync queue unavailable");
        }
        Ok(())
    }

    fn check_mark(&self) -> Result<()> {
        self.check_available()?;
        let injected = self
            .mark_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            anyhow::bail!("order sync queue write failed");
        }
        Ok(())
    }

    pub(crate) async fn push(&self, payment_id: Uuid, sync: &OrderSync) -> Result<i64> {
        self.check_available()?;
        let mut tasks = self.tasks.write().await;
        if let Some(existing) = tasks.iter().find(|t| t.task.payment_id == payment_id) {
            return Ok(existing.task.id);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        tasks.push(QueuedTask {
            task: OrderSyncTask {
                id,
                payment_id,
                order_id: sync.order_id,
                payment_status: sync.payment_status,
                order_status: sync.order_status,
                attempts: 0,
            },
            state: TaskState::Pending,
            next_attempt_at: now + Duration::seconds(INLINE_SYNC_GRACE_SECS),
            updated_at: now,
        });
        Ok(id)
    }
}

#[async_trait]
impl OrderSyncQueue for InMemoryOrderSyncQueue {
    async fn claim_due(&self, batch_size: i64) -> Result<Vec<OrderSyncTask>> {
        self.check_available()?;
        let now = Utc::now();
        let lease_cutoff = now - Duration::seconds(ORDER_SYNC_LEASE_SECS);
        let mut tasks = self.tasks.write().await;
        let mut out = Vec::new();
        for t in tasks.iter_mut() {
            if out.len() as i64 >= batch_size {
                break;
            }
            let due = match t.state {
                TaskState::Pending => t.next_attempt_at <= now,
                TaskState::Processing => t.updated_at < lease_cutoff,
                TaskState::Done => false,
            };
            if due {
                t.state = TaskState::Processing;
                t.updated_at = now;
                out.push(t.task.clone());
            }
        }
        Ok(out)
    }

    async fn mark_done(&self, id: i64) -> Result<()> {
        self.check_mark()?;
        let mut tasks = self.tasks.write().await;
        if let Some(t) = tasks.iter_mut().find(|t| t.task.id == id) {
            t.state = TaskState::Done;
            t.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_retry(&self, id: i64, attempts: i32, next_attempt_at: DateTime<Utc>) -> Result<()> {
        self.check_mark()?;
        let mut tasks = self.tasks.write().await;
        if let Some(t) = tasks.iter_mut().find(|t| t.task.id == id) {
            t.task.attempts = attempts;
            t.state = TaskState::Pending;
            t.next_attempt_at = next_attempt_at;
            t.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending(idempotency_reference: &str) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            idempotency_reference: idempotency_reference.to_string(),
            request_hash: "h".to_string(),
            reference: format!("ref-{idempotency_reference}"),
            amount: dec!(2700),
            currency: "NGN".to_string(),
            gateway: GatewayKind::Paystack,
            gateway_reference: Some("gw-1".to_string()),
            checkout_url: None,
            status: PaymentStatus::Pending,
            attempts: 1,
            created_at: Utc::now(),
            completed_at: None,
            failure_reason: None,
            gateway_response: None,
        }
    }

    fn completed_sync(order_id: Uuid) -> OrderSync {
        OrderSync {
            order_id,
            payment_status: PaymentStatus::Completed,
            order_status: Some(OrderStatus::Processing),
        }
    }

    #[tokio::test]
    async fn second_insert_with_same_key_returns_first_record() {
        let store = InMemoryPaymentStore::new();
        let (first, created) = store.insert_pending(pending("k1")).await.unwrap();
        assert!(created);
        let (second, created) = store.insert_pending(pending("k1")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn terminal_records_reject_further_transitions() {
        let store = InMemoryPaymentStore::new();
        let (rec, _) = store.insert_pending(pending("k2")).await.unwrap();
        let completion = Completion {
            amount: dec!(2700),
            gateway_reference: None,
            gateway_response: serde_json::json!({}),
            completed_at: Utc::now(),
        };
        let sync = completed_sync(rec.order_id);
        assert!(store.complete_if_pending(rec.id, &completion, &sync).await.unwrap().is_some());
        assert!(store.complete_if_pending(rec.id, &completion, &sync).await.unwrap().is_none());
        assert!(store
            .fail_if_pending(rec.id, "late", None, Utc::now(), &sync)
            .await
            .unwrap()
            .is_none());
        let stored = store.get(rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert_eq!(stored.gateway_reference.as_deref(), Some("gw-1"));
    }

    #[tokio::test]
    async fn transition_and_queued_order_update_land_together() {
        let queue = InMemoryOrderSyncQueue::new();
        let store = InMemoryPaymentStore::with_order_sync(queue.clone());
        let (rec, _) = store.insert_pending(pending("k4")).await.unwrap();
        let completion = Completion {
            amount: dec!(2700),
            gateway_reference: None,
            gateway_response: serde_json::json!({}),
            completed_at: Utc::now(),
        };

        queue.set_failing(true);
        assert!(store
            .complete_if_pending(rec.id, &completion, &completed_sync(rec.order_id))
            .await
            .is_err());
        assert_eq!(store.get(rec.id).await.unwrap().unwrap().status, PaymentStatus::Pending);

        queue.set_failing(false);
        let task_id = store
            .complete_if_pending(rec.id, &completion, &completed_sync(rec.order_id))
            .await
            .unwrap();
        let queued = queue.pending().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(Some(queued[0].id), task_id);
    }

    #[tokio::test]
    async fn overdue_claims_are_handed_out_again() {
        let queue = InMemoryOrderSyncQueue::new();
        queue.push(Uuid::new_v4(), &completed_sync(Uuid::new_v4())).await.unwrap();
        queue.make_all_due().await;

        assert_eq!(queue.claim_due(10).await.unwrap().len(), 1);
        assert!(queue.claim_due(10).await.unwrap().is_empty());

        queue.expire_leases().await;
        assert_eq!(queue.claim_due(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reservation_blocks_until_released_or_stale() {
        let store = InMemoryPaymentStore::new();
        let long_ago = Utc::now() - Duration::minutes(10);
        assert!(store.reserve_checkout("k5", long_ago).await.unwrap());
        assert!(!store.reserve_checkout("k5", long_ago).await.unwrap());
        assert!(store.reserve_checkout("k5", Utc::now() + Duration::seconds(1)).await.unwrap());

        store.release_checkout("k5").await.unwrap();
        assert!(store.reserve_checkout("k5", long_ago).await.unwrap());
    }

    #[tokio::test]
    async fn resolves_by_gateway_reference_within_gateway() {
        let store = InMemoryPaymentStore::new();
        let (rec, _) = store.insert_pending(pending("k3")).await.unwrap();
        let found = store.find_by_reference(GatewayKind::Paystack, "gw-1").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(rec.id));
        assert!(store
            .find_by_reference(GatewayKind::Monnify, "gw-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn injected_order_failures_are_consumed() {
        let orders = InMemoryOrderStore::new();
        let id = Uuid::new_v4();
        orders.insert_order(id, dec!(10)).await;
        orders.fail_next_updates(1);
        assert!(orders
            .set_payment_status(id, PaymentStatus::Completed, Some(OrderStatus::Processing))
            .await
            .is_err());
        orders
            .set_payment_status(id, PaymentStatus::Completed, Some(OrderStatus::Processing))
            .await
            .unwrap();
        assert_eq!(orders.updates().await.len(), 1);
        assert_eq!(orders.order(id).await.unwrap().status, OrderStatus::Processing);
    }
}
