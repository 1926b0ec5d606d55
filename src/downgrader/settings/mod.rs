//! Configuration for store access, repackaging and local serving.
//!
//! [`Settings`] is assembled through [`SettingsBuilder`], optionally seeded
//! from a TOML [`ConfigFile`]. Defaults point at the production store hosts.

mod builder;
mod core;
mod file;
mod retry;

pub use builder::SettingsBuilder;
pub use core::{InstallMode, Settings};
pub use file::ConfigFile;
pub use retry::RetryConfig;

use std::path::PathBuf;
use thiserror::Error;

/// Sign-in endpoint of the private store protocol.
pub const DEFAULT_AUTH_URL: &str =
    "https://p44-buy.itunes.apple.com/WebObjects/MZFinance.woa/wa/authenticate";

/// Product download endpoint of the private store protocol.
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://p25-buy.itunes.apple.com/WebObjects/MZFinance.woa/wa/volumeStoreDownloadProduct";

/// Public version history mirror.
pub const DEFAULT_MIRROR_URL: &str = "https://apis.bilin.eu.org/history/";

/// Service that turns query parameters into an OTA install manifest.
pub const DEFAULT_MANIFEST_SERVICE: &str = "https://api.palera.in/genPlist";

/// User agent the store expects from a provisioning client.
pub const DEFAULT_USER_AGENT: &str =
    "Configurator/2.17 (Macintosh; OS X 15.2; 24C5089c) AppleWebKit/0620.1.16.11.6";

/// Port the install manifest points the device at.
pub const DEFAULT_PORT: u16 = 9090;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A configured endpoint is not a valid absolute URL
    #[error("invalid {field} URL '{value}': {reason}")]
    InvalidUrl {
        /// Setting name
        field: &'static str,
        /// Offending value
        value: String,
        /// Parser message
        reason: String,
    },

    /// The config file could not be read
    #[error("could not read config file {}: {source}", .path.display())]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ConfigFile`]
    #[error("invalid config file {}: {reason}", .path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// No platform data directory and none configured
    #[error("no state directory available; pass --state-dir")]
    NoStateDir,
}
