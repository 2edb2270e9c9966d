//! Credential codec for secrets handed out by the routing authority.
//!
//! Blobs are `ivBase64:cipherBase64`: a 12-byte AES-256-GCM nonce and the ciphertext
//! with its tag appended. The shared key is normalized to 32 bytes by zero-padding or
//! truncation. This is lossy and is the wire contract, not a key-derivation scheme.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::SecretString;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// Zero-pad or truncate `key` to [`KEY_LEN`] bytes.
pub fn normalize_key(key: &[u8]) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    let n = key.len().min(KEY_LEN);
    out[..n].copy_from_slice(&key[..n]);
    out
}

fn cipher_for(key: &[u8]) -> Aes256Gcm {
    let normalized = normalize_key(key);
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&normalized))
}

/// Decrypt a credential blob. Any failure (missing key, malformed blob, wrong nonce
/// length, authentication failure, non-UTF-8 or empty plaintext) is logged and yields
/// `None`, meaning "no usable secret".
pub fn decrypt(blob: &str, key: &[u8]) -> Option<SecretString> {
    if key.is_empty() {
        tracing::warn!("credential key not configured; cannot decrypt secret");
        return None;
    }
    let Some((iv_b64, cipher_b64)) = blob.trim().split_once(':') else {
        tracing::warn!("credential blob is not in iv:cipher form");
        return None;
    };
    let iv = match STANDARD.decode(iv_b64) {
        Ok(iv) if iv.len() == NONCE_LEN => iv,
        Ok(iv) => {
            tracing::warn!(len = iv.len(), "credential iv has wrong length");
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "credential iv is not valid base64");
            return None;
        }
    };
    let ciphertext = match STANDARD.decode(cipher_b64) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "credential ciphertext is not valid base64");
            return None;
        }
    };
    let plaintext = match cipher_for(key).decrypt(Nonce::from_slice(&iv), ciphertext.as_ref()) {
        Ok(p) => p,
        Err(_) => {
            tracing::warn!("credential decryption failed");
            return None;
        }
    };
    match String::from_utf8(plaintext) {
        Ok(s) if !s.is_empty() => Some(SecretString::from(s)),
        Ok(_) => {
            tracing::warn!("credential decrypted to an empty secret");
            None
        }
        Err(_) => {
            tracing::warn!("credential plaintext is not valid UTF-8");
            None
        }
    }
}

/// Produce a blob that [`decrypt`] accepts, with a fresh random nonce.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Option<String> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher_for(key).encrypt(&nonce, plaintext.as_bytes()).ok()?;
    Some(format!(
        "{}:{}",
        STANDARD.encode(nonce.as_slice()),
        STANDARD.encode(ciphertext)
    ))
}
