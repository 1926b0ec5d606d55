//! Error types for the store, repackaging and serving layers.
//!
//! Each component owns one error enum so callers can report a distinct
//! message per failure kind. Remote-supplied detail is carried verbatim
//! whenever the store provides one.

use crate::downgrader::settings::SettingsError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for downgrade operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure of the downgrade pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Identity storage failure outside of sign-in
    #[error(transparent)]
    Secret(#[from] SecretStoreError),

    /// Sign-in failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Version discovery failure
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Download failure
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Repackaging failure
    #[error(transparent)]
    Repackage(#[from] RepackageError),

    /// Local server failure
    #[error(transparent)]
    Server(#[from] ServerError),

    /// An operation needs a session and none is stored
    #[error("not signed in")]
    NotAuthenticated,

    /// Work directory could not be prepared or removed
    #[error("work directory {} is unusable: {source}", .path.display())]
    WorkDir {
        /// Directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the [`SecretStore`](crate::downgrader::secret::SecretStore) contract.
#[derive(Error, Debug)]
pub enum SecretStoreError {
    /// No key has been generated yet (or it was wiped)
    #[error("no key available in the secret store")]
    KeyMissing,

    /// Encryption or decryption failed (wrong key, tampered blob)
    #[error("secret store crypto failure: {0}")]
    Crypto(String),

    /// Key or blob file could not be read or written
    #[error("secret store I/O failure at {}: {source}", .path.display())]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Decrypted identity could not be decoded
    #[error("persisted identity is corrupt: {0}")]
    Corrupt(String),
}

/// Authentication failures.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The account requires a one-time code and none was supplied
    #[error("a two-factor code is required to sign in to this account")]
    TwoFactorRequired,

    /// The store refused the credentials
    #[error(
        "sign-in rejected after {attempts} attempt(s): {}",
        .message.as_deref().unwrap_or("no detail from the store")
    )]
    InvalidCredentials {
        /// Attempts issued before giving up
        attempts: u32,
        /// `customerMessage` from the last response, if any
        message: Option<String>,
    },

    /// The store could not be reached
    #[error("could not reach the store: {0}")]
    Transport(String),

    /// The store answered with something we cannot decode
    #[error("unexpected sign-in response: {0}")]
    InvalidResponse(String),

    /// The persisted identity could not be stored or loaded
    #[error("credential storage failed: {0}")]
    Secret(#[from] SecretStoreError),
}

/// Version discovery failures.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The source returned no version identifiers
    #[error("no versions found for app {package_id}")]
    NoVersionsFound {
        /// Package that was queried
        package_id: String,
    },

    /// Network failure talking to the source
    #[error("version lookup failed: {0}")]
    Transport(String),

    /// The store refused the lookup
    #[error("the store refused the version lookup: {message}")]
    RemoteRejected {
        /// `customerMessage` from the store
        message: String,
    },

    /// Undecodable response body
    #[error("unexpected version list response: {0}")]
    InvalidResponse(String),
}

/// Download resolution and transfer failures.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The store refused to hand out the download
    #[error("the store refused the download: {message}")]
    RemoteRejected {
        /// `customerMessage` from the store
        message: String,
    },

    /// Network failure during resolution or transfer
    #[error("download failed: {0}")]
    Transport(String),

    /// The download server answered with an error status
    #[error("the download server answered {status}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
    },

    /// The archive could not be written locally
    #[error("could not write {}: {source}", .path.display())]
    Storage {
        /// Destination that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Undecodable response body
    #[error("unexpected download response: {0}")]
    InvalidResponse(String),
}

/// Stage of the repackaging pipeline, reported with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepackageStep {
    /// Extracting the downloaded archive
    Unpack,
    /// Finding the `.app` bundle under `Payload/`
    LocateBundle,
    /// Reading `Info.plist`
    ReadBundleInfo,
    /// Writing `iTunesMetadata.plist`
    WriteMetadata,
    /// Writing entitlement blobs
    InjectEntitlements,
    /// Producing the output archive
    Archive,
}

impl fmt::Display for RepackageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unpack => "unpack",
            Self::LocateBundle => "locate bundle",
            Self::ReadBundleInfo => "read bundle info",
            Self::WriteMetadata => "write metadata",
            Self::InjectEntitlements => "inject entitlements",
            Self::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// Repackaging failures. None of them are recoverable for the artifact.
#[derive(Error, Debug)]
pub enum RepackageError {
    /// Archive contents do not look like an app package
    #[error("malformed archive ({step}): {reason}")]
    MalformedArchive {
        /// Failing step
        step: RepackageStep,
        /// What was wrong
        reason: String,
    },

    /// The bundle's signature layout is not one we know how to fill
    #[error("unsupported entitlement layout: {reason}")]
    UnsupportedLayout {
        /// What was wrong
        reason: String,
    },

    /// Local filesystem failure
    #[error("I/O failure ({step}) at {}: {source}", .path.display())]
    IoFailure {
        /// Failing step
        step: RepackageStep,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl RepackageError {
    /// Step at which repackaging stopped.
    pub fn step(&self) -> RepackageStep {
        match self {
            Self::MalformedArchive { step, .. } | Self::IoFailure { step, .. } => *step,
            Self::UnsupportedLayout { .. } => RepackageStep::InjectEntitlements,
        }
    }

    pub(crate) fn malformed(step: RepackageStep, reason: impl Into<String>) -> Self {
        Self::MalformedArchive {
            step,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedLayout {
            reason: reason.into(),
        }
    }
}

/// Local distribution server failures.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Another process (or another install) already owns the port
    #[error("port {port} is already in use; is another install still being served?")]
    PortInUse {
        /// Port that was requested
        port: u16,
    },

    /// Binding failed for another reason
    #[error("could not bind {addr}: {source}")]
    BindFailed {
        /// Address that was requested
        addr: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The install page template could not be rendered
    #[error("could not render install page: {0}")]
    Template(String),

    /// The server stopped with an error
    #[error("distribution server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Attaches pipeline step and path context to I/O results.
pub trait ErrorExt<T> {
    /// Converts an I/O error into [`RepackageError::IoFailure`].
    fn fs_context(
        self,
        step: RepackageStep,
        path: impl AsRef<Path>,
    ) -> std::result::Result<T, RepackageError>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(
        self,
        step: RepackageStep,
        path: impl AsRef<Path>,
    ) -> std::result::Result<T, RepackageError> {
        self.map_err(|source| RepackageError::IoFailure {
            step,
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_message_includes_store_detail() {
        let err = AuthError::InvalidCredentials {
            attempts: 4,
            message: Some("Your account is locked.".into()),
        };
        assert_eq!(
            err.to_string(),
            "sign-in rejected after 4 attempt(s): Your account is locked."
        );

        let err = AuthError::InvalidCredentials {
            attempts: 1,
            message: None,
        };
        assert!(err.to_string().ends_with("no detail from the store"));
    }

    #[test]
    fn fs_context_records_step_and_path() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = result
            .fs_context(RepackageStep::Archive, "/tmp/out.ipa")
            .unwrap_err();
        assert_eq!(err.step(), RepackageStep::Archive);
        assert!(err.to_string().contains("/tmp/out.ipa"));
        assert!(err.to_string().contains("archive"));
    }
}
