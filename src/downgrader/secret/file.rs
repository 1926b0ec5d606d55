//! File-backed software secret store.

use super::{SecretStore, cipher};
use crate::downgrader::error::SecretStoreError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Name of the key file inside the state directory.
pub const KEY_FILE_NAME: &str = "identity.key";

/// Secret store keeping a base64-encoded AES-256 key in a private file.
///
/// This is a software stand-in for a hardware-backed key: the key is
/// protected only by file permissions (0600 on Unix).
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    key_path: PathBuf,
}

impl FileSecretStore {
    /// Creates a store whose key lives at `<state_dir>/identity.key`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            key_path: state_dir.join(KEY_FILE_NAME),
        }
    }

    /// Returns the key file location.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    fn io_error(&self, source: io::Error) -> SecretStoreError {
        SecretStoreError::Io {
            path: self.key_path.clone(),
            source,
        }
    }

    fn load_key(&self) -> Result<Vec<u8>, SecretStoreError> {
        let encoded = match std::fs::read_to_string(&self.key_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SecretStoreError::KeyMissing);
            }
            Err(e) => return Err(self.io_error(e)),
        };
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SecretStoreError::Crypto(format!("key file is not base64: {e}")))?;
        if key.len() != cipher::KEY_LEN {
            return Err(SecretStoreError::Crypto(format!(
                "key file holds {} bytes, expected {}",
                key.len(),
                cipher::KEY_LEN
            )));
        }
        Ok(key)
    }
}

impl SecretStore for FileSecretStore {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecretStoreError> {
        cipher::seal(&self.load_key()?, plaintext)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, SecretStoreError> {
        cipher::open(&self.load_key()?, blob)
    }

    fn generate_key(&self) -> Result<(), SecretStoreError> {
        if let Some(parent) = self.key_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let encoded = STANDARD.encode(cipher::generate_key());
        write_private(&self.key_path, encoded.as_bytes()).map_err(|e| self.io_error(e))?;

        log::debug!("Generated new identity key at {}", self.key_path.display());
        Ok(())
    }

    fn wipe(&self) -> Result<(), SecretStoreError> {
        match std::fs::remove_file(&self.key_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Writes `contents` to `path`, creating the file readable by the owner only.
///
/// A file left over from an earlier key keeps its inode, so its mode is
/// tightened before the new key is written.
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let file = options.open(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        write_all(file, contents)
    }
    #[cfg(not(unix))]
    {
        write_all(options.open(path)?, contents)
    }
}

fn write_all(mut file: File, contents: &[u8]) -> io::Result<()> {
    file.write_all(contents)?;
    file.sync_all()
}
