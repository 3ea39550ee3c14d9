//! At-rest encryption for the provider API key.
//!
//! AES-256-GCM with a key derived from the hostname and username, so a copied
//! settings.toml is useless on another machine or account.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

const NONCE_SIZE: usize = 12;
const KEY_SALT: &[u8] = b"scribe-api-key-encryption-v1";

fn machine_cipher() -> Result<Aes256Gcm, String> {
    let hostname = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());
    let username = whoami::username();

    let mut hasher = Sha256::new();
    hasher.update(KEY_SALT);
    hasher.update(hostname.as_bytes());
    hasher.update(b":");
    hasher.update(username.as_bytes());
    let key = hasher.finalize();

    Aes256Gcm::new_from_slice(&key).map_err(|e| format!("Failed to create cipher: {}", e))
}

/// Encrypt `plaintext`; the result is base64(nonce || ciphertext).
pub fn encrypt_string(plaintext: &str) -> Result<String, String> {
    let cipher = machine_cipher()?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|e| format!("Encryption failed: {}", e))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&combined))
}

/// Reverse of [`encrypt_string`].
pub fn decrypt_string(encrypted: &str) -> Result<String, String> {
    let cipher = machine_cipher()?;

    let combined = BASE64
        .decode(encrypted.trim())
        .map_err(|e| format!("Failed to decode base64: {}", e))?;

    if combined.len() < NONCE_SIZE {
        return Err("Encrypted data too short".to_string());
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| format!("Decryption failed: {}", e))?;

    String::from_utf8(plaintext).map_err(|e| format!("Invalid UTF-8 in decrypted data: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_survives_encryption() {
        let key = "AIzaSy-test-key-12345";
        let encrypted = encrypt_string(key).expect("encryption failed");
        assert_ne!(encrypted, key);
        assert_eq!(decrypt_string(&encrypted).expect("decryption failed"), key);
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let a = encrypt_string("same").unwrap();
        let b = encrypt_string("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_rejects_garbage() {
        assert!(decrypt_string("not-valid-base64!!!").is_err());
        assert!(decrypt_string(&BASE64.encode(b"short")).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let encrypted = encrypt_string("secret").unwrap();
        let mut raw = BASE64.decode(&encrypted).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        assert!(decrypt_string(&BASE64.encode(&raw)).is_err());
    }
}
