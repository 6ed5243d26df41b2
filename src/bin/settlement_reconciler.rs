use anyhow::Result;
use payment_settlement::config::AppConfig;
use payment_settlement::gateways::GatewaySet;
use payment_settlement::repo::audit_repo::AuditRepo;
use payment_settlement::repo::orders_repo::OrdersRepo;
use payment_settlement::repo::outbox_repo::OutboxRepo;
use payment_settlement::repo::payments_repo::PaymentsRepo;
use payment_settlement::repo::ports::{OrderStore, PaymentStore};
use payment_settlement::service::amount_validator::AmountValidator;
use payment_settlement::service::audit_log::SettlementAuditLog;
use payment_settlement::service::notifier::HttpNotifier;
use payment_settlement::service::reconciler::Reconciler;
use payment_settlement::service::webhook_processor::WebhookProcessor;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(cfg.gateway_timeout_ms))
        .build()?;
    let gateways = GatewaySet::from_config(&cfg, client.clone());
    let payments: Arc<dyn PaymentStore> = Arc::new(PaymentsRepo { pool: pool.clone() });
    let orders: Arc<dyn OrderStore> = Arc::new(OrdersRepo { pool: pool.clone() });
    let audit = SettlementAuditLog::new(Arc::new(AuditRepo { pool: pool.clone() }));

    let processor = WebhookProcessor {
        gateways: gateways.clone(),
        payments: payments.clone(),
        orders: orders.clone(),
        order_sync: Arc::new(OutboxRepo { pool }),
        validator: AmountValidator {
            policy: cfg.amount_policy.clone(),
            payments: payments.clone(),
            orders,
            audit: audit.clone(),
        },
        audit,
        notifier: Arc::new(HttpNotifier {
            client,
            target_url: cfg.notification_url.clone(),
        }),
    };
    let reconciler = Reconciler {
        gateways,
        payments,
        processor,
        grace: chrono::Duration::minutes(cfg.reconcile_after_minutes),
        batch_size: 100,
    };

    loop {
        if let Err(e) = reconciler.run_once().await {
            tracing::error!("reconciliation pass failed: {}", e);
        }
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    }
}
