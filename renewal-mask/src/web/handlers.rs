//! Webhook endpoint handlers.
//!
//! The order webhook answers as soon as it knows what to do with an order:
//! 1. Verify the body signature
//! 2. Parse and classify the order
//! 3. Return 200
//!
//! The Admin API calls for renewal orders are handed to the
//! [`RestoreScheduler`] and run in the background, so Shopify's delivery
//! timeout never includes them. The masking call yields once before it
//! starts; on the multi-threaded runtime that makes the response go out first
//! in practice, but it is not a guarantee at the wire level.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::WebhookError;
use crate::order::{Classification, OrderEvent};
use crate::shopify::CustomerApi;
use crate::suppress::{RestoreScheduler, SuppressionTask};
use crate::web::signature::verify_signature;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub customers: Arc<dyn CustomerApi>,
    pub restores: RestoreScheduler,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        customers: Arc<dyn CustomerApi>,
        restores: RestoreScheduler,
    ) -> Self {
        Self {
            config,
            customers,
            restores,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Order Webhook
// =============================================================================

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// `orders/create` webhook endpoint.
///
/// The body is taken as raw bytes because the signature covers the exact
/// payload; it is only parsed once verification has passed.
pub async fn order_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookError> {
    let config = &state.config;

    if config.mode.skips_signature_check() {
        warn!(mode = config.mode.as_str(), "signature_check_skipped");
    } else {
        let signature = headers
            .get(config.signature_header.as_str())
            .and_then(|v| v.to_str().ok());
        let secret = config.webhook_secret.as_deref().unwrap_or_default();

        if !verify_signature(Some(body.as_ref()), signature, secret) {
            warn!(
                has_signature = signature.is_some(),
                body_length = body.len(),
                "webhook_unauthorized"
            );
            return Err(WebhookError::Unauthorized);
        }
    }

    let order = OrderEvent::from_slice(&body).map_err(|e| {
        warn!(body_length = body.len(), error = %e, "webhook_payload_invalid");
        e
    })?;
    let order_id = order.order_ref();

    info!(
        order_id = %order_id,
        tags = order.tags.as_deref().unwrap_or(""),
        has_customer = order.customer.is_some(),
        "webhook_received"
    );

    let target = match order.classify(&config.target_tag) {
        Classification::Skip(reason) => {
            info!(order_id = %order_id, reason = reason.as_str(), "order_skipped");
            return Ok(Json(WebhookResponse {
                status: "ignored",
                reason: Some(reason.as_str()),
            }));
        }
        Classification::Suppress(target) => target,
    };

    info!(
        order_id = %order_id,
        customer_id = %target.customer_id,
        "renewal_order_detected"
    );

    let task = SuppressionTask::new(target, config.restore_delay);
    state
        .restores
        .submit(state.customers.clone(), task)
        .await
        .map_err(|e| {
            // Let Shopify redeliver to the next instance.
            error!(order_id = %order_id, error = %e, "webhook_rejected_shutting_down");
            e
        })?;

    Ok(Json(WebhookResponse {
        status: "accepted",
        reason: None,
    }))
}
