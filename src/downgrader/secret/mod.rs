//! Secret storage for the persisted sign-in identity.
//!
//! The platform key store is an external capability. Everything in this
//! crate talks to it through the [`SecretStore`] trait, so the
//! authentication layer never depends on a process-wide key.
//!
//! Two implementations ship with the crate:
//! - [`FileSecretStore`] keeps an AES-256-GCM key in a private file and is
//!   what the CLI uses on hosts without a hardware key store.
//! - [`MemorySecretStore`] keeps the key in memory, for tests and embedders
//!   that manage persistence themselves.

mod cipher;
mod file;
mod memory;
mod vault;

pub use file::FileSecretStore;
pub use memory::MemorySecretStore;
pub use vault::{CredentialVault, PersistedIdentity};

use crate::downgrader::error::SecretStoreError;

/// Contract of the device key store.
///
/// Implementations must guarantee `decrypt(encrypt(x)) == x` while the key
/// is unchanged, and must fail to decrypt blobs sealed under a key that has
/// since been wiped or regenerated.
pub trait SecretStore: Send + Sync {
    /// Seals `plaintext` under the current key.
    ///
    /// Returns [`SecretStoreError::KeyMissing`] if no key exists.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecretStoreError>;

    /// Opens a blob produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, SecretStoreError>;

    /// Creates a fresh key, replacing any existing one.
    fn generate_key(&self) -> Result<(), SecretStoreError>;

    /// Destroys the key. Blobs sealed under it become unreadable.
    fn wipe(&self) -> Result<(), SecretStoreError>;
}
