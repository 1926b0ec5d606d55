//! Core Settings struct and implementations.

use super::RetryConfig;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// How the device is pointed at the install manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    /// Open the local `/install` page, which navigates to the manifest.
    ///
    /// Newer OS versions block direct manifest URLs unless reached through a
    /// same-origin navigation.
    #[default]
    InstallPage,
    /// Open the `itms-services` manifest URL directly (older OS versions).
    DirectManifest,
}

/// Main settings for downgrade operations.
///
/// Constructed via [`SettingsBuilder`](super::SettingsBuilder).
///
/// # Examples
///
/// ```no_run
/// use ipa_downgrader::downgrader::SettingsBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = SettingsBuilder::new()
///     .state_dir("/var/lib/ipa_downgrader")
///     .port(9191)
///     .build()?;
/// assert_eq!(settings.port(), 9191);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Settings {
    /// Sign-in endpoint.
    auth_url: Url,

    /// `volumeStoreDownloadProduct` endpoint (without the `guid` query).
    download_url: Url,

    /// Public mirror base; package ids are appended as the last path segment.
    mirror_url: Url,

    /// Manifest generation service.
    manifest_service: String,

    /// User agent for store requests.
    user_agent: String,

    /// Timeout for individual store and mirror requests.
    request_timeout: Duration,

    /// Retry policy for artifact transfers.
    download_retry: RetryConfig,

    /// Interface the distribution server binds to.
    bind_host: IpAddr,

    /// Port the distribution server binds to.
    port: u16,

    /// Optional upper bound on how long one install is served.
    ///
    /// None means serve until explicitly stopped.
    serve_timeout: Option<Duration>,

    /// How the device is pointed at the manifest.
    install_mode: InstallMode,

    /// Directory holding the encrypted identity and key.
    state_dir: PathBuf,

    /// Scratch directory for downloaded and repackaged archives.
    work_dir: PathBuf,
}

impl Settings {
    /// Returns the sign-in endpoint.
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    /// Returns the product download endpoint.
    pub fn download_url(&self) -> &Url {
        &self.download_url
    }

    /// Returns the public mirror base URL.
    pub fn mirror_url(&self) -> &Url {
        &self.mirror_url
    }

    /// Returns the manifest generation service.
    pub fn manifest_service(&self) -> &str {
        &self.manifest_service
    }

    /// Returns the user agent sent to the store.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Returns the per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the download retry policy.
    pub fn download_retry(&self) -> &RetryConfig {
        &self.download_retry
    }

    /// Returns the distribution server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the socket address the distribution server binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }

    /// Returns the serve timeout, if any.
    pub fn serve_timeout(&self) -> Option<Duration> {
        self.serve_timeout
    }

    /// Returns the install trigger mode.
    pub fn install_mode(&self) -> InstallMode {
        self.install_mode
    }

    /// Returns the state directory.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Returns the scratch directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Creates a new Settings instance (used by SettingsBuilder).
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        auth_url: Url,
        download_url: Url,
        mirror_url: Url,
        manifest_service: String,
        user_agent: String,
        request_timeout: Duration,
        download_retry: RetryConfig,
        bind_host: IpAddr,
        port: u16,
        serve_timeout: Option<Duration>,
        install_mode: InstallMode,
        state_dir: PathBuf,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            auth_url,
            download_url,
            mirror_url,
            manifest_service,
            user_agent,
            request_timeout,
            download_retry,
            bind_host,
            port,
            serve_timeout,
            install_mode,
            state_dir,
            work_dir,
        }
    }
}
