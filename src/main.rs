use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bazaar_api::auth::AuthService;
use bazaar_api::catalog::{InMemoryCatalog, InMemoryCustomerDirectory};
use bazaar_api::config::load_config;
use bazaar_api::events::{event_channel, process_events};
use bazaar_api::repositories::InMemoryOrderStore;
use bazaar_api::services::payments::{HttpPaymentGateway, PaymentGateway, StaticPaymentGateway};
use bazaar_api::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let gateway: Arc<dyn PaymentGateway> = match &config.payment {
        Some(payment) => Arc::new(HttpPaymentGateway::new(payment.clone())),
        None => {
            warn!("no payment gateway configured, online checkout will not settle");
            Arc::new(StaticPaymentGateway::new())
        }
    };

    let (events, rx) = event_channel(config.event_buffer);
    tokio::spawn(process_events(rx));

    let state = AppState::new(
        Arc::new(AuthService::new(&config.jwt_secret, config.jwt_expiration)),
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(InMemoryCatalog::new()),
        Arc::new(InMemoryCustomerDirectory::new()),
        gateway,
        events,
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app_router(state))
        .await
        .context("Server error")?;
    Ok(())
}
