//! Shopify webhook signature verification.
//!
//! Shopify signs each webhook body with HMAC-SHA256 keyed by the app's
//! shared secret and sends the base64 digest in a request header. The digest
//! covers the exact bytes on the wire, so verification must run on the raw
//! body before it is parsed.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Compute the base64 HMAC-SHA256 of `body` keyed by `secret`.
pub fn compute_signature(body: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a webhook body against the signature header value.
///
/// # Arguments
///
/// * `body` - The raw request body, exactly as received
/// * `signature` - The base64 signature header value, if present
/// * `secret` - The shared webhook secret
///
/// # Returns
///
/// `true` only if all inputs are present and the signature matches.
pub fn verify_signature(body: Option<&[u8]>, signature: Option<&str>, secret: &str) -> bool {
    let (body, signature) = match (body, signature) {
        (Some(b), Some(s)) if !b.is_empty() && !s.trim().is_empty() => (b, s.trim()),
        _ => {
            warn!(
                has_body = body.map(|b| !b.is_empty()).unwrap_or(false),
                has_signature = signature.map(|s| !s.trim().is_empty()).unwrap_or(false),
                "webhook_signature_missing_fields"
            );
            return false;
        }
    };

    if secret.trim().is_empty() {
        warn!("webhook_signature_no_secret");
        return false;
    }

    let expected = match compute_signature(body, secret) {
        Some(sig) => sig,
        None => {
            warn!("webhook_signature_invalid_key");
            return false;
        }
    };

    // Constant-time comparison to prevent timing attacks
    let valid: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = signature.len(),
            "webhook_signature_mismatch"
        );
    }

    valid
}
