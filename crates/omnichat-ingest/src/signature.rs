// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook caller authentication.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the hex HMAC-SHA256 of an Avito webhook body.
pub const AVITO_SIGNATURE_HEADER: &str = "X-Avito-Signature";

/// Header carrying the secret token registered with `setWebhook`.
pub const TELEGRAM_SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Check a body signature against `secret`.
///
/// An empty secret disables the check. The comparison runs in constant
/// time over the decoded digest.
pub fn verify_body_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    if secret.is_empty() {
        return true;
    }
    let Some(signature) = signature else {
        return false;
    };
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Lowercase hex signature for `body`, as the platform computes it.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Compare a Telegram secret token header with the configured one.
pub fn verify_secret_token(expected: Option<&str>, presented: Option<&str>) -> bool {
    match expected.filter(|s| !s.is_empty()) {
        None => true,
        Some(expected) => presented.is_some_and(|p| {
            p.len() == expected.len()
                && p.bytes()
                    .zip(expected.bytes())
                    .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                    == 0
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"id":"w1"}"#;
        let signature = sign_body("hook", body);
        assert_eq!(signature.len(), 64);
        assert!(verify_body_signature("hook", body, Some(&signature)));
        assert!(verify_body_signature("hook", body, Some(&signature.to_uppercase())));
    }

    #[test]
    fn tampered_or_missing_signature_fails() {
        let signature = sign_body("hook", b"original");
        assert!(!verify_body_signature("hook", b"tampered", Some(&signature)));
        assert!(!verify_body_signature("hook", b"original", None));
        assert!(!verify_body_signature("hook", b"original", Some("not-hex")));
    }

    #[test]
    fn empty_secret_skips_check() {
        assert!(verify_body_signature("", b"anything", None));
    }

    #[test]
    fn telegram_secret_token() {
        assert!(verify_secret_token(None, None));
        assert!(verify_secret_token(Some("abc"), Some("abc")));
        assert!(!verify_secret_token(Some("abc"), Some("abd")));
        assert!(!verify_secret_token(Some("abc"), None));
    }
}
