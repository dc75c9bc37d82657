//! Renewal Mask web server.
//!
//! This binary:
//! - Receives Shopify `orders/create` webhooks
//! - Verifies the HMAC signature over the raw body
//! - Masks the customer email on renewal orders and restores it later
//!
//! On shutdown, restores still waiting on their delay are fired immediately.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use renewal_mask::{router, AppState, Config, RestoreScheduler, ShopifyClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        port = config.port,
        shop = %config.shop_domain,
        api_version = %config.api_version,
        api_token_set = !config.api_token.is_empty(),
        webhook_secret_set = config.webhook_secret.is_some(),
        mode = config.mode.as_str(),
        restore_delay_ms = config.restore_delay.as_millis() as u64,
        target_tag = %config.target_tag,
        "config_loaded"
    );

    if config.mode.skips_signature_check() {
        warn!("signature_verification_disabled");
    }

    let config = Arc::new(config);

    let customers =
        ShopifyClient::new(config.clone()).context("Failed to create HTTP client")?;
    let restores = RestoreScheduler::new();

    let state = AppState::new(config.clone(), Arc::new(customers), restores.clone());
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Put back any emails still masked
    restores.shutdown().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
