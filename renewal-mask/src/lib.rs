//! Renewal Mask - quiet subscription renewals on Shopify.
//!
//! Appstle renewal orders trigger Shopify's order confirmation email. This
//! service receives the `orders/create` webhook, and for renewal orders it
//! swaps the customer's email for a placeholder long enough for the
//! notification to miss, then puts the original address back.
//!
//! ## Flow
//!
//! ```text
//! Shopify → POST /webhook → verify → classify → 200
//!                                        └→ mask email → (delay) → restore email
//! ```

pub mod config;
pub mod error;
pub mod order;
pub mod shopify;
pub mod suppress;
pub mod web;

// Re-export commonly used types
pub use config::{Config, RunMode};
pub use error::{RemoteCallError, WebhookError};
pub use order::{Classification, OrderEvent, ResourceId, SkipReason};
pub use shopify::{CustomerApi, ShopifyClient};
pub use suppress::{RestoreScheduler, SuppressionTask};
pub use web::{router, AppState};
