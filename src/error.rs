//! Top-level error types with actionable messages and recovery suggestions.

use crate::downgrader::{
    AuthError, CatalogError, FetchError, RepackageError, SecretStoreError, ServerError,
    SettingsError,
};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, DowngraderError>;

/// Main error type for all downgrader operations
#[derive(Error, Debug)]
pub enum DowngraderError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pipeline errors
    #[error("{0}")]
    Downgrader(#[from] crate::downgrader::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

macro_rules! from_component {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for DowngraderError {
                fn from(e: $ty) -> Self {
                    Self::Downgrader(e.into())
                }
            }
        )*
    };
}

from_component!(
    SettingsError,
    SecretStoreError,
    AuthError,
    CatalogError,
    FetchError,
    RepackageError,
    ServerError,
);

impl DowngraderError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        use crate::downgrader::Error as E;

        let hints: &[&str] = match self {
            Self::Cli(CliError::InvalidArguments { .. }) => {
                &["Run with --help to see the expected arguments"]
            }
            Self::Io(_) => &["Check permissions on the state and work directories"],
            Self::Downgrader(inner) => match inner {
                E::Settings(SettingsError::NoStateDir) => {
                    &["Pass --state-dir or set state_dir in the config file"]
                }
                E::Settings(_) => &["Fix the configuration value named above"],
                E::NotAuthenticated => &["Run `login` first"],
                E::Secret(_) | E::Auth(AuthError::Secret(_)) => &[
                    "Run `logout` to discard the stored identity and rotate the key",
                    "Then sign in again with `login`",
                ],
                E::Auth(AuthError::TwoFactorRequired) => &[
                    "Re-run `login` with --code and the six-digit code shown on your device",
                ],
                E::Auth(AuthError::InvalidCredentials { .. }) => &[
                    "Check the Apple ID and password",
                    "If the account uses two-factor authentication, pass --code",
                ],
                E::Auth(AuthError::Transport(_)) | E::Catalog(CatalogError::Transport(_)) => {
                    &["Check your network connection and try again"]
                }
                E::Auth(AuthError::InvalidResponse(_))
                | E::Catalog(CatalogError::InvalidResponse(_))
                | E::Fetch(FetchError::InvalidResponse(_)) => &[
                    "The store answered in an unexpected format; try again later",
                    "Re-run with RUST_LOG=debug to see the exchange",
                ],
                E::Catalog(CatalogError::NoVersionsFound { .. }) => &[
                    "Check the app id or share link",
                    "Try the other version source with --source",
                ],
                E::Catalog(CatalogError::RemoteRejected { .. })
                | E::Fetch(FetchError::RemoteRejected { .. }) => &[
                    "Make sure the account has obtained this app at least once",
                    "Run `logout` and `login` again if the session may have expired",
                ],
                E::Fetch(FetchError::Transport(_)) => &[
                    "Check your network connection",
                    "Set download_retries in the config file to retry automatically",
                ],
                E::Fetch(FetchError::HttpStatus { .. }) => &[
                    "The download link may have expired; run the command again",
                    "Re-run with RUST_LOG=debug to see the download URL",
                ],
                E::Fetch(FetchError::Storage { .. }) | E::WorkDir { .. } => {
                    &["Free disk space or choose another --work-dir"]
                }
                E::Repackage(RepackageError::UnsupportedLayout { .. }) => {
                    &["This version uses an entitlement layout that cannot be filled; pick another version"]
                }
                E::Repackage(_) => &[
                    "The downloaded archive is unusable; try the download again",
                    "Pick another version if the problem persists",
                ],
                E::Server(ServerError::PortInUse { .. }) => &[
                    "Stop the other install still being served",
                    "Or choose another port with --port",
                ],
                E::Server(_) => &["Check that the loopback interface is available"],
            },
        };

        hints.iter().map(|h| (*h).to_string()).collect()
    }

    /// Whether re-running the same command may succeed without changes
    pub fn is_recoverable(&self) -> bool {
        use crate::downgrader::Error as E;
        matches!(
            self,
            Self::Downgrader(
                E::Auth(AuthError::Transport(_))
                    | E::Catalog(CatalogError::Transport(_))
                    | E::Fetch(FetchError::Transport(_))
                    | E::Server(ServerError::PortInUse { .. })
            )
        )
    }
}
