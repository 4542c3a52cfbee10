//! HMAC-SHA256 payload signing (§4.4).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign `timestamp.body` with `secret`, returning a lowercase hex digest.
pub fn sign_payload(secret: &str, timestamp: i64, body: &str) -> String {
    let signed = format!("{timestamp}.{body}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signed.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_signature() {
        let a = sign_payload("secret", 1000, "{\"event\":\"monitor.down\"}");
        let b = sign_payload("secret", 1000, "{\"event\":\"monitor.down\"}");
        assert_eq!(a, b);
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let a = sign_payload("secret-a", 1000, "body");
        let b = sign_payload("secret-b", 1000, "body");
        assert_ne!(a, b);
    }
}
