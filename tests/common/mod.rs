#![allow(dead_code)]

use payment_settlement::config::AmountPolicy;
use payment_settlement::domain::checkout::{CheckoutRequest, Customer, LineItem};
use payment_settlement::domain::payment::{GatewayKind, PaymentRecord, PaymentStatus};
use payment_settlement::gateways::mock::{MockBehavior, MockGateway};
use payment_settlement::gateways::signature::sign_sha512_hex;
use payment_settlement::gateways::GatewaySet;
use payment_settlement::repo::memory::{
    InMemoryAttemptStore, InMemoryAuditStore, InMemoryOrderStore, InMemoryOrderSyncQueue,
    InMemoryPaymentStore,
};
use payment_settlement::repo::ports::PaymentStore;
use payment_settlement::service::amount_validator::AmountValidator;
use payment_settlement::service::audit_log::SettlementAuditLog;
use payment_settlement::service::checkout_orchestrator::CheckoutOrchestrator;
use payment_settlement::service::notifier::RecordingNotifier;
use payment_settlement::service::order_sync_relay::OrderSyncRelay;
use payment_settlement::service::webhook_processor::WebhookProcessor;
use payment_settlement::AppState;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const SECRET: &str = "test-webhook-secret";
pub const ADMIN_KEY: &str = "test-admin-key";

pub struct Harness {
    pub paystack: Arc<MockGateway>,
    pub flutterwave: Arc<MockGateway>,
    pub monnify: Arc<MockGateway>,
    pub payments: InMemoryPaymentStore,
    pub attempts: InMemoryAttemptStore,
    pub orders: InMemoryOrderStore,
    pub audit: InMemoryAuditStore,
    pub queue: InMemoryOrderSyncQueue,
    pub notifier: RecordingNotifier,
    pub priority: Vec<GatewayKind>,
    pub call_timeout: Duration,
}

impl Harness {
    pub fn new(paystack: MockBehavior, flutterwave: MockBehavior, monnify: MockBehavior) -> Self {
        Self::build(paystack, flutterwave, monnify, SECRET)
    }

    pub fn succeeding() -> Self {
        Self::new(MockBehavior::Succeed, MockBehavior::Succeed, MockBehavior::Succeed)
    }

    pub fn with_secret(secret: &str) -> Self {
        Self::build(MockBehavior::Succeed, MockBehavior::Succeed, MockBehavior::Succeed, secret)
    }

    fn build(
        paystack: MockBehavior,
        flutterwave: MockBehavior,
        monnify: MockBehavior,
        secret: &str,
    ) -> Self {
        let queue = InMemoryOrderSyncQueue::new();
        Self {
            paystack: Arc::new(MockGateway::new(GatewayKind::Paystack, paystack, secret)),
            flutterwave: Arc::new(MockGateway::new(GatewayKind::Flutterwave, flutterwave, secret)),
            monnify: Arc::new(MockGateway::new(GatewayKind::Monnify, monnify, secret)),
            payments: InMemoryPaymentStore::with_order_sync(queue.clone()),
            attempts: InMemoryAttemptStore::new(),
            orders: InMemoryOrderStore::new(),
            audit: InMemoryAuditStore::new(),
            queue,
            notifier: RecordingNotifier::new(),
            priority: GatewayKind::ALL.to_vec(),
            call_timeout: Duration::from_secs(5),
        }
    }

    pub fn gateways(&self) -> GatewaySet {
        GatewaySet {
            paystack: self.paystack.clone(),
            flutterwave: self.flutterwave.clone(),
            monnify: self.monnify.clone(),
        }
    }

    pub fn orchestrator(&self) -> CheckoutOrchestrator {
        CheckoutOrchestrator {
            gateways: self.gateways(),
            default_priority: self.priority.clone(),
            payments: Arc::new(self.payments.clone()),
            attempts: Arc::new(self.attempts.clone()),
            call_timeout: self.call_timeout,
        }
    }

    pub fn processor(&self) -> WebhookProcessor {
        let audit = SettlementAuditLog::new(Arc::new(self.audit.clone()));
        WebhookProcessor {
            gateways: self.gateways(),
            payments: Arc::new(self.payments.clone()),
            orders: Arc::new(self.orders.clone()),
            order_sync: Arc::new(self.queue.clone()),
            validator: AmountValidator {
                policy: AmountPolicy::default(),
                payments: Arc::new(self.payments.clone()),
                orders: Arc::new(self.orders.clone()),
                audit: audit.clone(),
            },
            audit,
            notifier: Arc::new(self.notifier.clone()),
        }
    }

    pub fn relay(&self) -> OrderSyncRelay {
        OrderSyncRelay {
            queue: Arc::new(self.queue.clone()),
            orders: Arc::new(self.orders.clone()),
            batch_size: 10,
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            checkout: self.orchestrator(),
            webhooks: self.processor(),
            payments: Arc::new(self.payments.clone()),
            attempts: Arc::new(self.attempts.clone()),
            audit: Arc::new(self.audit.clone()),
            internal_api_key: ADMIN_KEY.to_string(),
        }
    }

    /// Stores an order with `order_total` and a PENDING payment for it on `gateway`.
    pub async fn pending_payment(&self, order_total: Decimal, gateway: GatewayKind) -> PaymentRecord {
        let order_id = Uuid::new_v4();
        self.orders.insert_order(order_id, order_total).await;
        self.pending_payment_for(order_id, order_total, gateway).await
    }

    pub async fn pending_payment_for(
        &self,
        order_id: Uuid,
        amount: Decimal,
        gateway: GatewayKind,
    ) -> PaymentRecord {
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            order_id,
            idempotency_reference: format!("chk_{}", Uuid::new_v4().simple()),
            request_hash: "hash".to_string(),
            reference: format!("PH-{}", Uuid::new_v4().simple().to_string().to_uppercase()),
            amount,
            currency: "NGN".to_string(),
            gateway,
            gateway_reference: Some(format!("mock_txn_{}", Uuid::new_v4().simple())),
            checkout_url: None,
            status: PaymentStatus::Pending,
            attempts: 1,
            created_at: chrono::Utc::now(),
            completed_at: None,
            failure_reason: None,
            gateway_response: None,
        };
        let (stored, created) = self.payments.insert_pending(record).await.unwrap();
        assert!(created);
        stored
    }

    pub async fn payment(&self, id: Uuid) -> PaymentRecord {
        self.payments.get(id).await.unwrap().unwrap()
    }
}

pub fn checkout_request(order_id: Uuid, amount_minor: i64, key: &str) -> CheckoutRequest {
    CheckoutRequest {
        order_id,
        amount_minor,
        currency: "NGN".to_string(),
        customer: Customer {
            email: "ada@example.com".to_string(),
            phone: "08031234567".to_string(),
            name: "Ada Obi".to_string(),
        },
        items: vec![LineItem {
            name: "Amoxicillin 500mg".to_string(),
            quantity: 1,
            unit_price_minor: amount_minor,
        }],
        delivery: None,
        idempotency_reference: key.to_string(),
    }
}

/// Mock gateway callback body, amount in major units as sent.
pub fn mock_webhook(event: &str, reference: &str, amount: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "event": event,
        "data": {
            "reference": reference,
            "amount": amount,
            "currency": "NGN",
            "id": "mock_txn_42"
        }
    }))
    .unwrap()
}

pub fn sign(body: &[u8]) -> String {
    sign_sha512_hex(SECRET, body)
}
