//! Configuration module for environment variable parsing.
//!
//! Everything the service needs is read once at startup and handed to the
//! handlers through [`crate::web::AppState`]; nothing reads the environment
//! after that.

use std::env;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::warn;
use url::Url;

use crate::error::RemoteCallError;
use crate::order::ResourceId;

/// Tag Appstle puts on every recurring subscription order.
pub const DEFAULT_TARGET_TAG: &str = "appstle_subscription_recurring_order";

/// Header Shopify uses for the base64 HMAC of the webhook body.
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Shopify-Hmac-Sha256";

/// Execution mode. Only `Development` skips signature verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Production,
    Development,
}

impl RunMode {
    /// Parse an `APP_ENV` value. Anything that is not explicitly a
    /// development value is treated as production.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => RunMode::Development,
            _ => RunMode::Production,
        }
    }

    pub fn skips_signature_check(self) -> bool {
        matches!(self, RunMode::Development)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Production => "production",
            RunMode::Development => "development",
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret for webhook HMAC verification
    pub webhook_secret: Option<String>,

    /// Shop hostname, e.g. `example.myshopify.com`
    pub shop_domain: String,

    /// Admin API version segment, e.g. `2024-01`
    pub api_version: String,

    /// Admin API access token
    pub api_token: String,

    /// Port for the web server to listen on
    pub port: u16,

    pub mode: RunMode,

    /// Time between masking an email and putting it back
    pub restore_delay: Duration,

    /// Order tag that marks a renewal, stored trimmed and lowercased
    pub target_tag: String,

    /// Name of the header carrying the body signature
    pub signature_header: String,

    /// Timeout applied to each Admin API request
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            webhook_secret: env::var("WEBHOOK_SECRET").ok(),

            shop_domain: env::var("SHOPIFY_SHOP").unwrap_or_default(),

            api_version: env::var("SHOPIFY_API_VERSION")
                .unwrap_or_else(|_| "2024-01".to_string()),

            api_token: env::var("SHOPIFY_API_TOKEN").unwrap_or_default(),

            port: parse_or("PORT", 3000),

            mode: env::var("APP_ENV")
                .map(|v| RunMode::parse(&v))
                .unwrap_or_default(),

            restore_delay: Duration::from_millis(parse_or("RESTORE_DELAY_MS", 8000)),

            target_tag: env::var("TARGET_ORDER_TAG")
                .ok()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_TARGET_TAG.to_string()),

            signature_header: env::var("SIGNATURE_HEADER")
                .unwrap_or_else(|_| DEFAULT_SIGNATURE_HEADER.to_string()),

            request_timeout: Duration::from_millis(parse_or("REQUEST_TIMEOUT_MS", 10_000)),
        }
    }

    /// Reject configurations the service cannot safely run with.
    pub fn validate(&self) -> Result<()> {
        if self.mode == RunMode::Production && !has_value(&self.webhook_secret) {
            bail!("WEBHOOK_SECRET must be set in production mode");
        }
        if self.shop_domain.trim().is_empty() {
            bail!("SHOPIFY_SHOP must be set");
        }
        if self.api_token.trim().is_empty() {
            bail!("SHOPIFY_API_TOKEN must be set");
        }
        Ok(())
    }

    /// Admin API URL for a single customer record.
    pub fn customer_url(&self, customer_id: &ResourceId) -> Result<Url, RemoteCallError> {
        let base = Url::parse(&format!("https://{}/", self.shop_domain.trim()))?;
        let url = base.join(&format!(
            "admin/api/{}/customers/{}.json",
            self.api_version, customer_id
        ))?;
        Ok(url)
    }
}

fn has_value(value: &Option<String>) -> bool {
    value.as_ref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Parse a numeric variable, falling back to `default` when unset or invalid.
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid numeric value, using default");
            default
        }
    }
}
