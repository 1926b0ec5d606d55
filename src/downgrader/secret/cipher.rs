//! AES-256-GCM sealing shared by the software stores.
//!
//! Blob layout: 12-byte random nonce followed by the ciphertext and tag.

use crate::downgrader::error::SecretStoreError;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};

pub(super) const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

pub(super) fn generate_key() -> [u8; KEY_LEN] {
    rand::random()
}

pub(super) fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SecretStoreError> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| SecretStoreError::Crypto(e.to_string()))?;
    let nonce_bytes: [u8; NONCE_LEN] = rand::random();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| SecretStoreError::Crypto("encryption failed".into()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

pub(super) fn open(key: &[u8], blob: &[u8]) -> Result<Vec<u8>, SecretStoreError> {
    if blob.len() < NONCE_LEN {
        return Err(SecretStoreError::Crypto("blob shorter than nonce".into()));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| SecretStoreError::Crypto(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SecretStoreError::Crypto("decryption failed (wrong key or tampered blob)".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_blobs_use_fresh_nonces() {
        let key = generate_key();
        let a = seal(&key, b"same").unwrap();
        let b = seal(&key, b"same").unwrap();
        assert_ne!(a, b);
        assert_eq!(open(&key, &a).unwrap(), b"same");
        assert_eq!(open(&key, &b).unwrap(), b"same");
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let key = generate_key();
        let mut blob = seal(&key, b"payload").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(open(&key, &blob).is_err());
        assert!(open(&key, &blob[..4]).is_err());
    }
}
