// Manual dispatch webhook signatures
//
// Callers sign the raw request body with HMAC-SHA256 using the shared dispatch
// secret and send the hex digest in the `X-Signature` header.

use crate::errors::DispatchError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC-SHA256 of the request body
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Sign a payload, returning the lowercase hex digest
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, DispatchError> {
    let mut mac = new_mac(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Validate a hex-encoded HMAC-SHA256 signature for a dispatch request
///
/// Returns `Ok(false)` for a well-formed request whose signature does not
/// match, including signatures that are not valid hex.
pub fn validate_dispatch_signature(
    payload: &[u8],
    signature: &str,
    secret: &str,
) -> Result<bool, DispatchError> {
    let mut mac = new_mac(secret)?;
    mac.update(payload);

    let Ok(provided) = hex::decode(signature.trim()) else {
        return Ok(false);
    };

    // verify_slice compares in constant time
    Ok(mac.verify_slice(&provided).is_ok())
}

fn new_mac(secret: &str) -> Result<HmacSha256, DispatchError> {
    if secret.is_empty() {
        return Err(DispatchError::InvalidSecret("secret is empty".to_string()));
    }
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DispatchError::InvalidSecret(e.to_string()))
}
