//! Relaycast service.
//!
//! Consumes events from Kafka, broadcasts each one to every configured target
//! and records abandoned deliveries in PostgreSQL. Runs until CTRL+C or
//! SIGTERM, then finishes the record in flight, lets started deliveries settle
//! within the grace period and closes the pool.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use relaycast::{Config, LogFormat, Relay};
use relaycast_consumer::{KafkaConfig, KafkaDeadLetterPublisher, KafkaSource};
use relaycast_core::storage::Storage;
use relaycast_delivery::PostgresFailureStore;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config);

    info!(
        database_url = %config.database_url_masked(),
        targets = ?config.targets,
        channel = %config.consumer_channel,
        brokers = %config.kafka_brokers,
        "configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    let storage = Arc::new(Storage::new(pool.clone()));
    storage.ensure_schema().await.context("failed to prepare failure record schema")?;
    info!("database ready");

    let kafka = KafkaConfig {
        brokers: config.kafka_brokers.clone(),
        group_id: config.kafka_group_id.clone(),
        channel: config.consumer_channel.clone(),
        publish_timeout: Duration::from_secs(5),
    };
    let mut source = KafkaSource::connect(&kafka)?;
    let dead_letters = KafkaDeadLetterPublisher::connect(&kafka)?;

    let grace = config.shutdown_grace();
    let relay = Relay::builder(config)
        .failure_store(Arc::new(PostgresFailureStore::new(storage)))
        .dead_letter_publisher(Arc::new(dead_letters))
        .build()?;

    let shutdown = CancellationToken::new();
    let consumer = tokio::spawn({
        let relay = relay.clone();
        let shutdown = shutdown.clone();
        async move { relay.run(&mut source, shutdown).await }
    });

    info!("relaycast is consuming");

    shutdown_signal().await;
    info!("shutdown signal received, stopping consumer");
    shutdown.cancel();

    match consumer.await {
        Ok(stats) => info!(
            processed = stats.processed,
            dead_lettered = stats.dead_lettered,
            "consumer stopped"
        ),
        Err(e) => warn!(error = %e, "consumer task ended abnormally"),
    }

    let pending = relay.dispatcher().stats().pending;
    if pending > 0 {
        info!(pending, grace_ms = grace.as_millis(), "waiting for deliveries to settle");
    }
    let abandoned = relay.dispatcher().drain(grace).await;
    if abandoned > 0 {
        error!(abandoned, "deliveries abandoned at shutdown without a failure record");
    }

    pool.close().await;
    info!("relaycast shutdown complete");
    Ok(())
}

/// Initializes tracing from `RUST_LOG`, falling back to the configured filter.
fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.rust_log))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_file(true).with_line_number(true))
            .init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
    }
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received CTRL+C signal");
        },
        () = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
