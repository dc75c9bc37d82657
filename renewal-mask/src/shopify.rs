//! Shopify Admin API access for customer records.
//!
//! The handler only talks to [`CustomerApi`], so tests can swap in a
//! recording implementation instead of hitting the network.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::config::Config;
use crate::error::RemoteCallError;
use crate::order::ResourceId;

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Operations the service performs on a remote customer record.
#[async_trait]
pub trait CustomerApi: Send + Sync {
    /// Fetch the current customer record. Informational only.
    async fn fetch_customer(&self, customer_id: &ResourceId)
        -> Result<serde_json::Value, RemoteCallError>;

    /// Overwrite the customer's email address.
    async fn update_email(&self, customer_id: &ResourceId, email: &str)
        -> Result<(), RemoteCallError>;
}

#[derive(Serialize)]
struct CustomerUpdate<'a> {
    customer: CustomerFields<'a>,
}

#[derive(Serialize)]
struct CustomerFields<'a> {
    id: &'a ResourceId,
    email: &'a str,
}

/// Admin API client backed by a shared reqwest connection pool.
#[derive(Clone)]
pub struct ShopifyClient {
    client: Client,
    config: Arc<Config>,
}

impl ShopifyClient {
    pub fn new(config: Arc<Config>) -> Result<Self, RemoteCallError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }
}

/// Turn a non-2xx response into an error carrying the body text.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteCallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RemoteCallError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CustomerApi for ShopifyClient {
    async fn fetch_customer(
        &self,
        customer_id: &ResourceId,
    ) -> Result<serde_json::Value, RemoteCallError> {
        let url = self.config.customer_url(customer_id)?;

        let response = self
            .client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, &self.config.api_token)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn update_email(
        &self,
        customer_id: &ResourceId,
        email: &str,
    ) -> Result<(), RemoteCallError> {
        let url = self.config.customer_url(customer_id)?;
        let body = CustomerUpdate {
            customer: CustomerFields {
                id: customer_id,
                email,
            },
        };

        let response = match self
            .client
            .put(url)
            .header(ACCESS_TOKEN_HEADER, &self.config.api_token)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    error!(
                        customer_id = %customer_id,
                        timeout_ms = self.config.request_timeout.as_millis() as u64,
                        error = %e,
                        "shopify_update_timeout"
                    );
                }
                return Err(e.into());
            }
        };

        let status = response.status().as_u16();
        check_status(response).await?;

        info!(customer_id = %customer_id, status_code = status, "shopify_customer_updated");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_body_shape() {
        let id = ResourceId::Number(55);
        let body = CustomerUpdate {
            customer: CustomerFields {
                id: &id,
                email: "a@x.com",
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"customer": {"id": 55, "email": "a@x.com"}})
        );
    }
}
