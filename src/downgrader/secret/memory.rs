//! In-memory secret store.

use super::{SecretStore, cipher};
use crate::downgrader::error::SecretStoreError;
use std::sync::Mutex;

/// Secret store holding its key in process memory.
///
/// Starts with a key already generated. Used by tests and by embedders that
/// hand the crate a key store they manage elsewhere.
pub struct MemorySecretStore {
    key: Mutex<Option<[u8; cipher::KEY_LEN]>>,
}

impl MemorySecretStore {
    /// Creates a store with a freshly generated key.
    pub fn new() -> Self {
        Self {
            key: Mutex::new(Some(cipher::generate_key())),
        }
    }

    /// Creates a store with no key; the first [`encrypt`](SecretStore::encrypt)
    /// fails with [`SecretStoreError::KeyMissing`] until a key is generated.
    pub fn empty() -> Self {
        Self {
            key: Mutex::new(None),
        }
    }

    fn current_key(&self) -> Result<[u8; cipher::KEY_LEN], SecretStoreError> {
        let guard = self
            .key
            .lock()
            .map_err(|_| SecretStoreError::Crypto("key lock poisoned".into()))?;
        (*guard).ok_or(SecretStoreError::KeyMissing)
    }

    fn replace_key(&self, key: Option<[u8; cipher::KEY_LEN]>) -> Result<(), SecretStoreError> {
        let mut guard = self
            .key
            .lock()
            .map_err(|_| SecretStoreError::Crypto("key lock poisoned".into()))?;
        *guard = key;
        Ok(())
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for MemorySecretStore {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecretStoreError> {
        cipher::seal(&self.current_key()?, plaintext)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, SecretStoreError> {
        cipher::open(&self.current_key()?, blob)
    }

    fn generate_key(&self) -> Result<(), SecretStoreError> {
        self.replace_key(Some(cipher::generate_key()))
    }

    fn wipe(&self) -> Result<(), SecretStoreError> {
        self.replace_key(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_for_assorted_payloads() {
        let store = MemorySecretStore::new();
        let payloads: [&[u8]; 4] = [b"", b"x", b"{\"appleId\":\"a@b.c\"}", &[0u8; 4096]];
        for payload in payloads {
            let blob = store.encrypt(payload).unwrap();
            assert_eq!(store.decrypt(&blob).unwrap(), payload);
        }
    }

    #[test]
    fn wipe_makes_blobs_unreadable() {
        let store = MemorySecretStore::new();
        let blob = store.encrypt(b"secret").unwrap();

        store.wipe().unwrap();
        assert!(matches!(store.decrypt(&blob), Err(SecretStoreError::KeyMissing)));

        store.generate_key().unwrap();
        assert!(matches!(store.decrypt(&blob), Err(SecretStoreError::Crypto(_))));
    }

    #[test]
    fn empty_store_needs_a_key() {
        let store = MemorySecretStore::empty();
        assert!(matches!(store.encrypt(b"x"), Err(SecretStoreError::KeyMissing)));
        store.generate_key().unwrap();
        assert!(store.encrypt(b"x").is_ok());
    }
}
