//! Order event payload and renewal classification.
//!
//! Only the handful of fields the service acts on are modelled; everything
//! else in the Shopify order payload is ignored.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WebhookError;

/// Shopify resource identifier. Numeric in practice, but kept in whatever
/// JSON shape it arrived in so it round-trips unchanged into API calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Number(n) => write!(f, "{}", n),
            ResourceId::Text(s) => f.write_str(s),
        }
    }
}

/// `orders/create` webhook payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderEvent {
    #[serde(default)]
    pub id: Option<ResourceId>,
    /// Comma separated tag list
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub customer: Option<Customer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: Option<ResourceId>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Why an order was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotTargetTag,
    MissingCustomer,
    MissingEmail,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NotTargetTag => "not_target_tag",
            SkipReason::MissingCustomer => "missing_customer",
            SkipReason::MissingEmail => "missing_email",
        }
    }
}

/// Customer whose email should be masked for this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionTarget {
    pub order_id: Option<ResourceId>,
    pub customer_id: ResourceId,
    pub original_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Skip(SkipReason),
    Suppress(SuppressionTarget),
}

impl OrderEvent {
    /// Decode a raw webhook body.
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Display form of the order id for logging.
    pub fn order_ref(&self) -> String {
        self.id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Decide whether this order is a renewal we should act on.
    ///
    /// `target_tag` must already be lowercased. A tagged order with a
    /// customer id is still skipped when the customer has no usable email,
    /// since masking it would leave nothing to write back. Callers that only
    /// look at the tag and customer id will see `MissingEmail` skips they do
    /// not expect.
    pub fn classify(&self, target_tag: &str) -> Classification {
        let tags = parse_tags(self.tags.as_deref().unwrap_or(""));
        if !tags.iter().any(|t| t == target_tag) {
            return Classification::Skip(SkipReason::NotTargetTag);
        }

        let customer = match &self.customer {
            Some(c) => c,
            None => return Classification::Skip(SkipReason::MissingCustomer),
        };

        let customer_id = match &customer.id {
            Some(id) => id.clone(),
            None => return Classification::Skip(SkipReason::MissingCustomer),
        };

        // Nothing to restore afterwards, so masking would lose the field.
        // Blank-only counts as missing, but the stored value is written back
        // exactly as received.
        let original_email = match customer.email.as_deref() {
            Some(email) if !email.trim().is_empty() => email.to_string(),
            _ => return Classification::Skip(SkipReason::MissingEmail),
        };

        Classification::Suppress(SuppressionTarget {
            order_id: self.id.clone(),
            customer_id,
            original_email,
        })
    }
}

/// Split a Shopify tag string into normalized tags.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
