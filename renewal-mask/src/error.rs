//! Error types for the inbound webhook and the outbound Admin API calls.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::web::WebhookResponse;

/// Failures that end a webhook request before it is acknowledged.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook signature missing or invalid")]
    Unauthorized,

    #[error("payload is not a valid order: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("webhook could not be processed: {0}")]
    Unavailable(String),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            WebhookError::Unauthorized => "unauthorized",
            WebhookError::MalformedPayload(_) => "invalid_payload",
            WebhookError::Unavailable(_) => "error",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(WebhookResponse {
                status: self.code(),
                reason: None,
            }),
        )
            .into_response()
    }
}

/// Failures talking to the Shopify Admin API.
///
/// These happen after the webhook has been acknowledged, so they are only
/// ever logged.
#[derive(Debug, Error)]
pub enum RemoteCallError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid customer url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
