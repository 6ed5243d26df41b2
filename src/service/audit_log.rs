use crate::domain::audit::AuditEntry;
use crate::repo::ports::AuditStore;
use std::sync::Arc;

/// Write side of the settlement audit trail. Recording never fails the caller: a lost
/// audit row is logged and settlement carries on.
#[derive(Clone)]
pub struct SettlementAuditLog {
    store: Arc<dyn AuditStore>,
}

impl SettlementAuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.store.append(&entry).await {
            tracing::error!(
                payment_id = %entry.payment_id,
                decision = entry.decision.as_str(),
                reason = %entry.reason,
                "failed to append settlement audit entry: {}",
                e
            );
        }
    }
}
