//! Encrypted persistence of the signed-in identity.

use super::SecretStore;
use crate::downgrader::error::SecretStoreError;
use crate::downgrader::types::{Credential, SessionContext};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the encrypted identity blob inside the state directory.
pub const BLOB_FILE_NAME: &str = "authinfo";

/// Everything needed to resume a session without signing in again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedIdentity {
    /// Account credentials, including the derived GUID
    pub credential: Credential,
    /// Captured request context
    pub session: SessionContext,
}

/// Couples a [`SecretStore`] with the single encrypted blob on disk.
///
/// Absence of the blob means "no stored identity".
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn SecretStore>,
    blob_path: PathBuf,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("store", &"<SecretStore>")
            .field("blob_path", &self.blob_path)
            .finish()
    }
}

impl CredentialVault {
    /// Creates a vault storing its blob at `<state_dir>/authinfo`.
    pub fn new(store: Arc<dyn SecretStore>, state_dir: &Path) -> Self {
        Self {
            store,
            blob_path: state_dir.join(BLOB_FILE_NAME),
        }
    }

    /// Returns the blob location.
    pub fn blob_path(&self) -> &Path {
        &self.blob_path
    }

    /// Encrypts and writes the identity, generating a key first if the
    /// store has none.
    pub fn persist(&self, identity: &PersistedIdentity) -> Result<(), SecretStoreError> {
        let plaintext =
            serde_json::to_vec(identity).map_err(|e| SecretStoreError::Corrupt(e.to_string()))?;

        let blob = match self.store.encrypt(&plaintext) {
            Err(SecretStoreError::KeyMissing) => {
                log::info!("No identity key present, generating one");
                self.store.generate_key()?;
                self.store.encrypt(&plaintext)?
            }
            other => other?,
        };

        if let Some(parent) = self.blob_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let staging = self.blob_path.with_extension("tmp");
        std::fs::write(&staging, &blob).map_err(|e| self.io_error(e))?;
        std::fs::rename(&staging, &self.blob_path).map_err(|e| self.io_error(e))?;

        log::debug!("Saved encrypted identity to {}", self.blob_path.display());
        Ok(())
    }

    /// Reads and decrypts the identity. `Ok(None)` when nothing is stored.
    pub fn load(&self) -> Result<Option<PersistedIdentity>, SecretStoreError> {
        let blob = match std::fs::read(&self.blob_path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let plaintext = self.store.decrypt(&blob)?;
        let identity =
            serde_json::from_slice(&plaintext).map_err(|e| SecretStoreError::Corrupt(e.to_string()))?;
        Ok(Some(identity))
    }

    /// Deletes the stored blob, if any.
    pub fn clear(&self) -> Result<(), SecretStoreError> {
        match std::fs::remove_file(&self.blob_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Deletes the blob, destroys the key and generates a fresh one.
    pub fn reset(&self) -> Result<(), SecretStoreError> {
        self.clear()?;
        self.store.wipe()?;
        self.store.generate_key()
    }

    fn io_error(&self, source: io::Error) -> SecretStoreError {
        SecretStoreError::Io {
            path: self.blob_path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downgrader::secret::MemorySecretStore;
    use std::collections::BTreeMap;

    fn identity() -> PersistedIdentity {
        PersistedIdentity {
            credential: Credential::new("user@example.com", "hunter2"),
            session: SessionContext {
                apple_id: "user@example.com".into(),
                guid: "00ABCDEF0123".into(),
                headers: BTreeMap::from([("X-Dsid".to_string(), "42".to_string())]),
                cookies: Vec::new(),
                account_name: "Jane Appleseed".into(),
                created_at: chrono::Utc::now(),
            },
        }
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(Arc::new(MemorySecretStore::new()), dir.path());

        assert_eq!(vault.load().unwrap(), None);
        let stored = identity();
        vault.persist(&stored).unwrap();
        assert_eq!(vault.load().unwrap(), Some(stored));

        let raw = std::fs::read(vault.blob_path()).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("hunter2"));
    }

    #[test]
    fn persist_generates_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(Arc::new(MemorySecretStore::empty()), dir.path());
        vault.persist(&identity()).unwrap();
        assert!(vault.load().unwrap().is_some());
    }

    #[test]
    fn reset_discards_identity() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(Arc::new(MemorySecretStore::new()), dir.path());
        vault.persist(&identity()).unwrap();

        vault.reset().unwrap();
        assert!(!vault.blob_path().exists());
        assert_eq!(vault.load().unwrap(), None);
    }
}
