use crate::error::BrokerError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

// Create a type alias for the HMAC-SHA256 implementation.
type HmacSha256 = Hmac<Sha256>;

/// Creates an HMAC-SHA256 signature for a given query string.
///
/// Every private broker call is signed over its full query string, timestamp
/// included, so the signature must be recomputed for each attempt.
///
/// # Returns
///
/// The lowercase hexadecimal signature.
pub fn sign_request(secret: &str, query_string: &str) -> Result<String, BrokerError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BrokerError::Configuration(format!("unusable API secret: {e}")))?;
    mac.update(query_string.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
