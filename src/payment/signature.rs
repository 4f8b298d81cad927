//! HMAC-SHA256 signature primitives
//!
//! Two signatures cross the trust boundary: the payment verification
//! signature over `"{order_id}|{payment_id}"` (keyed with the API secret)
//! and the webhook signature over the raw request body (keyed with the
//! webhook secret). Both are lowercase hex. Verification uses the MAC's
//! constant-time comparison; a malformed hex signature simply fails.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a message, returning lowercase hex
pub fn sign(secret: &str, message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature over a message
pub fn verify(secret: &str, message: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// The message signed during payment verification
pub fn payment_payload(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}
