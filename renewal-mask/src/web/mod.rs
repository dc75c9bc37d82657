//! Web server module for the Shopify order webhook.
//!
//! This module provides a thin web server that:
//! - Receives `orders/create` webhooks
//! - Verifies the body signature
//! - Acknowledges immediately and masks renewal emails in the background

pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{health, order_webhook, AppState, HealthResponse, WebhookResponse};
pub use signature::{compute_signature, verify_signature};

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(order_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
