use std::sync::Arc;

use anyhow::Context;
use price_sentinel::{
    api::{ self, AppState },
    db::{ AlertRepository, AlertStore, Pool, PriceRepository, PriceStore },
    notifier::{ EmailNotifier, LogNotifier, Notifier },
    providers::{ MoralisClient, PriceSource },
    scheduler::StatusHandle,
    services::{ AlertService, PriceQueryService },
    Config,
    PriceScheduler,
    SchedulerSettings,
};
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber
        ::registry()
        .with(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| "price_sentinel=debug,tower_http=debug".into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    // Connects and creates the schema once, before anything reads or writes
    let pool = Pool::new(config.database_url.clone(), config.database_max_connections);
    let db = pool.get().await.context("failed to initialize database")?;

    let price_store: Arc<dyn PriceStore> = Arc::new(PriceRepository::new(db.clone()));
    let alert_store: Arc<dyn AlertStore> = Arc::new(AlertRepository::new(db));

    let settings = SchedulerSettings::from_config(&config);
    let scheduler_status = match config.require_price_api_key() {
        Ok(api_key) => {
            let source: Arc<dyn PriceSource> = Arc::new(
                MoralisClient::new(api_key, &config.price_api_url, &config.price_chain)
            );

            let notifier: Arc<dyn Notifier> = match &config.email {
                Some(email) => Arc::new(EmailNotifier::new(email.clone(), config.notify_timeout)?),
                None => {
                    tracing::warn!("EMAIL_API_URL/EMAIL_API_KEY/EMAIL_FROM not set, alerts will only be logged");
                    Arc::new(LogNotifier)
                }
            };

            let scheduler = Arc::new(
                PriceScheduler::new(source, price_store.clone(), alert_store.clone(), notifier, settings)
            );
            let status = scheduler.status();
            scheduler.spawn();
            status
        }
        Err(e) => {
            tracing::error!("Price scheduler not started: {}", e);
            StatusHandle::disabled(&settings, e.to_string())
        }
    };

    let app_state = AppState::new(
        AlertService::new(alert_store),
        PriceQueryService::new(price_store),
        scheduler_status
    );
    let app = api::router(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener
        ::bind(&addr).await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal()).await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
