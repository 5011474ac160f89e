// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-level AES-256-GCM seal/open operations and the text field encoding.
//!
//! Every call to [`seal`] generates a fresh random 96-bit nonce via the system
//! CSPRNG. Nonce reuse would be catastrophic for GCM security.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use omnichat_core::OmnichatError;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

fn cipher(key: &[u8; 32]) -> Result<LessSafeKey, OmnichatError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| OmnichatError::Internal("failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt plaintext with a random nonce. Returns `(ciphertext_with_tag, nonce)`.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN]), OmnichatError> {
    let sealing = cipher(key)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| OmnichatError::Internal("failed to generate random nonce".to_string()))?;

    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce_bytes), Aad::empty(), &mut in_out)
        .map_err(|_| OmnichatError::Internal("AES-256-GCM encryption failed".to_string()))?;
    Ok((in_out, nonce_bytes))
}

/// Decrypt ciphertext produced by [`seal`]. A wrong key or tampered input
/// yields `VaultDecryptFailed`.
pub fn open(
    key: &[u8; 32],
    nonce_bytes: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, OmnichatError> {
    let opening = cipher(key)?;
    let mut in_out = ciphertext.to_vec();
    let plaintext = opening
        .open_in_place(Nonce::assume_unique_for_key(*nonce_bytes), Aad::empty(), &mut in_out)
        .map_err(|_| {
            OmnichatError::VaultDecryptFailed("wrong key or corrupted data".to_string())
        })?;
    Ok(plaintext.to_vec())
}

/// Seal a text field as `base64(nonce || ciphertext)`. Empty stays empty.
pub fn encrypt_field(key: &[u8; 32], plaintext: &str) -> Result<String, OmnichatError> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }
    let (ciphertext, nonce) = seal(key, plaintext.as_bytes())?;
    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

/// Inverse of [`encrypt_field`]. Empty stays empty.
pub fn decrypt_field(key: &[u8; 32], encoded: &str) -> Result<String, OmnichatError> {
    if encoded.is_empty() {
        return Ok(String::new());
    }
    let blob = STANDARD
        .decode(encoded)
        .map_err(|e| OmnichatError::VaultDecryptFailed(format!("not base64: {e}")))?;
    if blob.len() < NONCE_LEN {
        return Err(OmnichatError::VaultDecryptFailed(
            "ciphertext shorter than nonce".to_string(),
        ));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let nonce: [u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| OmnichatError::VaultDecryptFailed("bad nonce".to_string()))?;
    let plaintext = open(key, &nonce, ciphertext)?;
    String::from_utf8(plaintext)
        .map_err(|_| OmnichatError::VaultDecryptFailed("plaintext is not UTF-8".to_string()))
}

/// Generate a random 32-byte key suitable for AES-256-GCM.
pub fn generate_random_key() -> Result<[u8; 32], OmnichatError> {
    let mut key = [0u8; 32];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| OmnichatError::Internal("failed to generate random key".to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_roundtrip() {
        let key = generate_random_key().unwrap();
        let sealed = encrypt_field(&key, "access-token-value").unwrap();
        assert_ne!(sealed, "access-token-value");
        assert_eq!(decrypt_field(&key, &sealed).unwrap(), "access-token-value");
    }

    #[test]
    fn empty_maps_to_empty() {
        let key = generate_random_key().unwrap();
        assert_eq!(encrypt_field(&key, "").unwrap(), "");
        assert_eq!(decrypt_field(&key, "").unwrap(), "");
    }

    #[test]
    fn same_plaintext_seals_differently() {
        let key = generate_random_key().unwrap();
        let a = encrypt_field(&key, "same").unwrap();
        let b = encrypt_field(&key, "same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_is_decrypt_failure() {
        let a = generate_random_key().unwrap();
        let b = generate_random_key().unwrap();
        let sealed = encrypt_field(&a, "secret").unwrap();
        assert!(matches!(
            decrypt_field(&b, &sealed),
            Err(OmnichatError::VaultDecryptFailed(_))
        ));
    }

    #[test]
    fn tampered_or_garbage_input_fails() {
        let key = generate_random_key().unwrap();
        let (mut ct, nonce) = seal(&key, b"do not tamper").unwrap();
        ct[0] ^= 0x01;
        assert!(open(&key, &nonce, &ct).is_err());
        assert!(decrypt_field(&key, "!!not base64!!").is_err());
        assert!(decrypt_field(&key, "AAAA").is_err());
    }

    #[test]
    fn ciphertext_carries_gcm_tag() {
        let key = generate_random_key().unwrap();
        let (ct, _) = seal(&key, b"hello").unwrap();
        assert_eq!(ct.len(), 5 + 16);
    }
}
