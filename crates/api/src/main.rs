use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use form_webhooks_api::app::{create_app, AppState, Delivery};
use form_webhooks_api::config::Config;
use form_webhooks_api::jobs::{JobScheduler, QueueMetricsJob, WebhookQueueConsumerJob};
use form_webhooks_api::middleware::{init_metrics, logging::init_logging};

const JOB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_logging(&config.logging);
    init_metrics().context("failed to install Prometheus recorder")?;

    info!("Starting form webhooks v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let delivery = Delivery::from_config(&config, &pool).context("invalid webhook signing key")?;

    let mut scheduler = JobScheduler::new();
    scheduler.register(WebhookQueueConsumerJob::new(
        delivery.consumer.clone(),
        Duration::from_secs(config.queue.poll_interval_secs),
    ));
    scheduler.register(QueueMetricsJob::new(
        delivery.queue.clone(),
        Some(pool.clone()),
    ));
    scheduler.start();

    let app = create_app(&config, AppState::new(pool, &delivery));

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !delivery.drain(JOB_SHUTDOWN_TIMEOUT).await {
        warn!(
            pending = delivery.tasks.len(),
            "Shutdown timed out with webhook deliveries still in flight"
        );
    }

    scheduler.shutdown();
    scheduler.wait_for_shutdown(JOB_SHUTDOWN_TIMEOUT).await;

    info!("Shutdown complete");
    Ok(())
}

/// Waits for CTRL+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received CTRL+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}
