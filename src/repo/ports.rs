use crate::domain::audit::AuditEntry;
use crate::domain::payment::{
    Completion, GatewayAttempt, GatewayKind, OrderStatus, PaymentRecord, PaymentStatus,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_by_idempotency(&self, idempotency_reference: &str) -> Result<Option<PaymentRecord>>;

    /// Inserts a PENDING record unless one already exists for its idempotency reference.
    /// Returns the stored record and whether this call created it.
    async fn insert_pending(&self, record: PaymentRecord) -> Result<(PaymentRecord, bool)>;

    async fn get(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>>;

    /// Resolves a merchant or gateway reference within one gateway.
    async fn find_by_reference(
        &self,
        gateway: GatewayKind,
        reference: &str,
    ) -> Result<Option<PaymentRecord>>;

    /// PENDING -> COMPLETED, queueing `sync` in the same transaction. Returns the id of
    /// the queued order update, or `None` when the record already left PENDING.
    async fn complete_if_pending(
        &self,
        payment_id: Uuid,
        completion: &Completion,
        sync: &OrderSync,
    ) -> Result<Option<i64>>;

    /// PENDING -> FAILED, queueing `sync` in the same transaction. Returns the id of the
    /// queued order update, or `None` when the record already left PENDING.
    async fn fail_if_pending(
        &self,
        payment_id: Uuid,
        reason: &str,
        gateway_response: Option<&serde_json::Value>,
        at: DateTime<Utc>,
        sync: &OrderSync,
    ) -> Result<Option<i64>>;

    /// Claims an idempotency reference for one in-flight checkout. A claim made before
    /// `stale_before` is taken over. Returns false while another checkout holds it.
    async fn reserve_checkout(
        &self,
        idempotency_reference: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<bool>;

    async fn release_checkout(&self, idempotency_reference: &str) -> Result<()>;

    async fn list_pending_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<PaymentRecord>>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn insert(&self, attempt: &GatewayAttempt) -> Result<()>;
    async fn list_by_reference(&self, idempotency_reference: &str) -> Result<Vec<GatewayAttempt>>;
}

/// The storefront's order aggregate, seen from settlement.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn order_total(&self, order_id: Uuid) -> Result<Option<Decimal>>;
    async fn set_payment_status(
        &self,
        order_id: Uuid,
        payment_status: PaymentStatus,
        order_status: Option<OrderStatus>,
    ) -> Result<()>;
}

/// Append-only; entries are never updated or deleted.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<()>;
    async fn list_for_payment(&self, payment_id: Uuid) -> Result<Vec<AuditEntry>>;
}

/// The order update owed by a terminal payment transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSync {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_status: Option<OrderStatus>,
}

/// How long the inline order update has before the relay may apply a queued one.
pub const INLINE_SYNC_GRACE_SECS: i64 = 30;

/// How long a claimed outbox row stays invisible to other relays.
pub const ORDER_SYNC_LEASE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSyncTask {
    pub id: i64,
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_status: Option<OrderStatus>,
    pub attempts: i32,
}

/// Outbox of order updates. Rows are written by the payment transition itself; this
/// side claims and settles them.
#[async_trait]
pub trait OrderSyncQueue: Send + Sync {
    /// Claims due PENDING rows, plus PROCESSING rows whose lease has run out.
    async fn claim_due(&self, batch_size: i64) -> Result<Vec<OrderSyncTask>>;
    async fn mark_done(&self, id: i64) -> Result<()>;
    async fn mark_retry(&self, id: i64, attempts: i32, next_attempt_at: DateTime<Utc>) -> Result<()>;
}
