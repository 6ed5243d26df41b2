use axum::middleware::from_fn_with_state;
use payment_settlement::config::AppConfig;
use payment_settlement::gateways::GatewaySet;
use payment_settlement::http::middleware::rate_limit::{enforce, RateLimitState};
use payment_settlement::http::routes::router;
use payment_settlement::repo::audit_repo::AuditRepo;
use payment_settlement::repo::orders_repo::OrdersRepo;
use payment_settlement::repo::outbox_repo::OutboxRepo;
use payment_settlement::repo::payment_attempts_repo::PaymentAttemptsRepo;
use payment_settlement::repo::payments_repo::PaymentsRepo;
use payment_settlement::repo::ports::{AttemptStore, AuditStore, OrderStore, OrderSyncQueue, PaymentStore};
use payment_settlement::service::amount_validator::AmountValidator;
use payment_settlement::service::audit_log::SettlementAuditLog;
use payment_settlement::service::checkout_orchestrator::CheckoutOrchestrator;
use payment_settlement::service::notifier::HttpNotifier;
use payment_settlement::service::order_sync_relay::OrderSyncRelay;
use payment_settlement::service::webhook_processor::WebhookProcessor;
use payment_settlement::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let payments: Arc<dyn PaymentStore> = Arc::new(PaymentsRepo { pool: pool.clone() });
    let attempts: Arc<dyn AttemptStore> = Arc::new(PaymentAttemptsRepo { pool: pool.clone() });
    let orders: Arc<dyn OrderStore> = Arc::new(OrdersRepo { pool: pool.clone() });
    let audit_store: Arc<dyn AuditStore> = Arc::new(AuditRepo { pool: pool.clone() });
    let order_sync: Arc<dyn OrderSyncQueue> = Arc::new(OutboxRepo { pool: pool.clone() });

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(cfg.gateway_timeout_ms))
        .build()?;
    let gateways = if cfg.mock_gateways {
        tracing::warn!("MOCK_GATEWAYS is set, no real gateway will be called");
        GatewaySet::mocks(&cfg.mock_webhook_secret)
    } else {
        GatewaySet::from_config(&cfg, client.clone())
    };
    if cfg.gateway_priority.is_empty() {
        tracing::warn!("GATEWAY_PRIORITY has no known gateways, checkouts will fail");
    }

    let audit = SettlementAuditLog::new(audit_store.clone());
    let checkout = CheckoutOrchestrator {
        gateways: gateways.clone(),
        default_priority: cfg.gateway_priority.clone(),
        payments: payments.clone(),
        attempts: attempts.clone(),
        call_timeout: Duration::from_millis(cfg.gateway_call_timeout_ms),
    };
    let webhooks = WebhookProcessor {
        gateways,
        payments: payments.clone(),
        orders: orders.clone(),
        order_sync: order_sync.clone(),
        validator: AmountValidator {
            policy: cfg.amount_policy.clone(),
            payments: payments.clone(),
            orders: orders.clone(),
            audit: audit.clone(),
        },
        audit,
        notifier: Arc::new(HttpNotifier {
            client,
            target_url: cfg.notification_url.clone(),
        }),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = OrderSyncRelay {
        queue: order_sync,
        orders,
        batch_size: 100,
        poll_interval: Duration::from_secs(5),
    };
    let relay_handle = tokio::spawn(relay.run(shutdown_rx));

    let state = AppState {
        checkout,
        webhooks,
        payments,
        attempts,
        audit: audit_store,
        internal_api_key: cfg.internal_api_key.clone(),
    };

    let app = router(state).layer(from_fn_with_state(
        RateLimitState {
            redis_client: redis::Client::open(cfg.redis_url.clone())?,
            max_per_minute: cfg.rate_limit_per_minute,
        },
        enforce,
    ));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = relay_handle.await;
    Ok(())
}
