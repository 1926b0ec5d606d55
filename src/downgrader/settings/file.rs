//! TOML configuration file.

use super::SettingsError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// On-disk configuration. Every field is optional; unset fields keep the
/// builder defaults.
///
/// ```toml
/// port = 9191
/// download_retries = 2
/// serve_timeout_secs = 900
/// mirror_url = "https://mirror.example/history/"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Sign-in endpoint override.
    pub auth_url: Option<String>,

    /// Download endpoint override.
    pub download_url: Option<String>,

    /// Public mirror override.
    pub mirror_url: Option<String>,

    /// Manifest service override.
    pub manifest_service: Option<String>,

    /// User agent override.
    pub user_agent: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,

    /// Download retries after the first attempt.
    pub download_retries: Option<u32>,

    /// Distribution server port.
    pub port: Option<u16>,

    /// Stop serving after this many seconds.
    pub serve_timeout_secs: Option<u64>,

    /// Open the manifest URL directly instead of the install page.
    pub legacy_install: Option<bool>,

    /// Identity storage directory.
    pub state_dir: Option<PathBuf>,

    /// Scratch directory.
    pub work_dir: Option<PathBuf>,
}

impl ConfigFile {
    /// Reads and parses a config file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|reason| SettingsError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parses config file content.
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}
