pub mod config;
pub mod domain {
    pub mod audit;
    pub mod checkout;
    pub mod payment;
    pub mod webhook;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod errors;
    pub mod handlers {
        pub mod checkout;
        pub mod payments;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod admin_auth;
        pub mod rate_limit;
    }
    pub mod routes;
}
pub mod repo {
    pub mod audit_repo;
    pub mod memory;
    pub mod orders_repo;
    pub mod outbox_repo;
    pub mod payment_attempts_repo;
    pub mod payments_repo;
    pub mod ports;
}
pub mod service {
    pub mod amount_validator;
    pub mod audit_log;
    pub mod checkout_orchestrator;
    pub mod notifier;
    pub mod order_sync_relay;
    pub mod reconciler;
    pub mod webhook_processor;
}

use repo::ports::{AttemptStore, AuditStore, PaymentStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub checkout: service::checkout_orchestrator::CheckoutOrchestrator,
    pub webhooks: service::webhook_processor::WebhookProcessor,
    pub payments: Arc<dyn PaymentStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub audit: Arc<dyn AuditStore>,
    pub internal_api_key: String,
}
