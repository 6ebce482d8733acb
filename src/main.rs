use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_pipeline::api::OrderApi;
use order_pipeline::config::Settings;
use order_pipeline::consumer::{BatchConsumer, OrderCreatedProcessor, OrderStatusChangedProcessor};
use order_pipeline::domain::audit_log::AuditLogOrderService;
use order_pipeline::domain::order::OrderService;
use order_pipeline::messaging::{KafkaChannel, KafkaPublisher, Publisher};
use order_pipeline::metrics::Metrics;
use order_pipeline::persistence::PgUnitOfWorkFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_pipeline=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order pipeline consumers");

    let settings = Settings::from_env().context("invalid configuration")?;

    // === 1. Postgres pool ===
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await
        .context("failed to connect to Postgres")?;
    let uow_factory = Arc::new(PgUnitOfWorkFactory::new(pool));

    // === 2. Metrics and publisher ===
    let metrics = Arc::new(Metrics::new()?);
    let publisher: Arc<dyn Publisher> = Arc::new(KafkaPublisher::new(
        &settings.kafka,
        settings.publisher.clone(),
        metrics.clone(),
    )?);

    // === 3. Services ===
    let orders = Arc::new(OrderService::new(uow_factory.clone(), publisher.clone()));
    let audit_log = Arc::new(AuditLogOrderService::new(uow_factory));
    let api = Arc::new(OrderApi::new(orders, audit_log));

    // === 4. Consumers ===
    let created_settings = settings.order_created_consumer.clone();
    let order_created = BatchConsumer::new(
        created_settings.clone(),
        Arc::new(KafkaChannel::new(&settings.kafka, &created_settings.consumer_tag)),
        Arc::new(OrderCreatedProcessor::new(api.clone())),
        Some(publisher.clone()),
        metrics.clone(),
    );

    let status_settings = settings.order_status_changed_consumer.clone();
    let order_status_changed = BatchConsumer::new(
        status_settings.clone(),
        Arc::new(KafkaChannel::new(&settings.kafka, &status_settings.consumer_tag)),
        Arc::new(OrderStatusChangedProcessor::new(api)),
        Some(publisher),
        metrics,
    );

    // === 5. Run until Ctrl-C or a fatal consumer error ===
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
        tracing::info!("Shutdown requested");
        signal.cancel();
    });

    let result = tokio::try_join!(
        run_consumer(&order_created, shutdown.clone()),
        run_consumer(&order_status_changed, shutdown.clone()),
    );

    match result {
        Ok(_) => {
            tracing::info!("✅ Consumers stopped cleanly");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "💀 Consumer failed");
            Err(e.into())
        }
    }
}

/// A fatal error in one consumer stops the other one too.
async fn run_consumer(
    consumer: &BatchConsumer,
    shutdown: CancellationToken,
) -> Result<(), order_pipeline::consumer::ConsumerError> {
    let result = consumer.run(shutdown.clone()).await;
    if result.is_err() {
        shutdown.cancel();
    }
    result
}
