use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vendra_api::middleware::governor::AdmissionGovernor;
use vendra_api::state::AuthConfig;
use vendra_api::{app, AppState};
use vendra_core::payment::WebhookVerifier;
use vendra_order::clients::{GrpcCartClient, GrpcInventoryClient};
use vendra_order::models::OrderPolicy;
use vendra_order::settlement::SandboxProvider;
use vendra_order::{OrderOrchestrator, PaymentSettlementEngine, VendorLedgerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vendra_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = vendra_store::app_config::Config::load().context("failed to load config")?;
    tracing::info!("Starting Vendra order core on port {}", config.server.port);

    let db = vendra_store::DbClient::new(&config.database.url)
        .await
        .context("failed to connect to Postgres")?;

    let redis = Arc::new(
        vendra_store::RedisClient::new(&config.redis.url)
            .await
            .context("failed to connect to Redis")?,
    );

    let kafka = Arc::new(
        vendra_store::EventProducer::new(&config.kafka.brokers)
            .context("failed to create Kafka producer")?,
    );

    let client_timeout = Duration::from_secs(config.business_rules.client_timeout_seconds);
    let inventory = Arc::new(
        GrpcInventoryClient::connect(
            config.business_rules.inventory_endpoint.clone(),
            client_timeout,
        )
        .await
        .context("failed to connect to inventory service")?,
    );
    let cart = Arc::new(
        GrpcCartClient::connect(config.business_rules.cart_endpoint.clone(), client_timeout)
            .await
            .context("failed to connect to cart service")?,
    );

    let order_repo = Arc::new(vendra_store::PgOrderRepository::new(db.pool.clone()));
    let payment_repo = Arc::new(vendra_store::PgPaymentRepository::new(db.pool.clone()));
    let ledger_repo = Arc::new(vendra_store::PgVendorLedgerRepository::new(db.pool.clone()));
    let ledger = Arc::new(VendorLedgerService::new(ledger_repo));

    let settlement = Arc::new(PaymentSettlementEngine::new(
        Arc::new(SandboxProvider),
        payment_repo,
        ledger.clone(),
        kafka.clone(),
        config.business_rules.currency.clone(),
    ));

    let orchestrator = Arc::new(OrderOrchestrator::new(
        order_repo,
        inventory,
        cart,
        settlement.clone(),
        ledger,
        kafka,
        OrderPolicy {
            platform_fee_bps: config.business_rules.platform_fee_bps,
            currency: config.business_rules.currency.clone(),
        },
    ));

    // Checkout-completion consumer runs as its own task for the life of
    // the process.
    tokio::spawn(vendra_api::worker::start_checkout_worker(
        config.kafka.brokers.clone(),
        config.kafka.consumer_group.clone(),
        orchestrator.clone(),
        redis.clone(),
        config.business_rules.idempotency_ttl_seconds,
    ));

    let metrics = Arc::new(prometheus::Registry::new());
    let governor = Arc::new(AdmissionGovernor::new(
        config.governor.max_in_flight,
        Duration::from_secs(config.governor.default_deadline_seconds),
        &metrics,
    ));

    let app_state = AppState {
        orchestrator,
        settlement,
        verifier: Arc::new(WebhookVerifier::new(config.payment.webhook_secret.clone())),
        governor,
        metrics,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
