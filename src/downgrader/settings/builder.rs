//! Builder for constructing Settings.

use super::{
    ConfigFile, DEFAULT_AUTH_URL, DEFAULT_DOWNLOAD_URL, DEFAULT_MANIFEST_SERVICE,
    DEFAULT_MIRROR_URL, DEFAULT_PORT, DEFAULT_USER_AGENT, InstallMode, RetryConfig, Settings,
    SettingsError,
};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Builder for constructing [`Settings`].
///
/// Every field has a production default; tests point the endpoints at a
/// mock server.
///
/// # Examples
///
/// ```no_run
/// use ipa_downgrader::downgrader::SettingsBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = SettingsBuilder::new()
///     .mirror_url("https://mirror.example/history/")
///     .download_retries(2)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SettingsBuilder {
    auth_url: Option<String>,
    download_url: Option<String>,
    mirror_url: Option<String>,
    manifest_service: Option<String>,
    user_agent: Option<String>,
    request_timeout: Option<Duration>,
    download_retries: Option<u32>,
    bind_host: Option<IpAddr>,
    port: Option<u16>,
    serve_timeout: Option<Duration>,
    install_mode: Option<InstallMode>,
    state_dir: Option<PathBuf>,
    work_dir: Option<PathBuf>,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Seeds the builder from a config file. Later setter calls win.
    pub fn config_file(mut self, file: ConfigFile) -> Self {
        self.auth_url = file.auth_url.or(self.auth_url);
        self.download_url = file.download_url.or(self.download_url);
        self.mirror_url = file.mirror_url.or(self.mirror_url);
        self.manifest_service = file.manifest_service.or(self.manifest_service);
        self.user_agent = file.user_agent.or(self.user_agent);
        self.request_timeout = file
            .request_timeout_secs
            .map(Duration::from_secs)
            .or(self.request_timeout);
        self.download_retries = file.download_retries.or(self.download_retries);
        self.port = file.port.or(self.port);
        self.serve_timeout = file
            .serve_timeout_secs
            .map(Duration::from_secs)
            .or(self.serve_timeout);
        if let Some(legacy) = file.legacy_install {
            self.install_mode = Some(if legacy {
                InstallMode::DirectManifest
            } else {
                InstallMode::InstallPage
            });
        }
        self.state_dir = file.state_dir.or(self.state_dir);
        self.work_dir = file.work_dir.or(self.work_dir);
        self
    }

    /// Sets the sign-in endpoint.
    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    /// Sets the product download endpoint.
    pub fn download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    /// Sets the public mirror base URL.
    pub fn mirror_url(mut self, url: impl Into<String>) -> Self {
        self.mirror_url = Some(url.into());
        self
    }

    /// Sets the manifest generation service.
    pub fn manifest_service(mut self, url: impl Into<String>) -> Self {
        self.manifest_service = Some(url.into());
        self
    }

    /// Sets the user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Sets the per-request timeout.
    ///
    /// Default: 60 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets how many times a failed artifact transfer is retried.
    ///
    /// Default: 0
    pub fn download_retries(mut self, retries: u32) -> Self {
        self.download_retries = Some(retries);
        self
    }

    /// Sets the interface the distribution server binds to.
    ///
    /// Default: 127.0.0.1
    pub fn bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = Some(host);
        self
    }

    /// Sets the distribution server port.
    ///
    /// Default: 9090
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Bounds how long one install is served.
    ///
    /// Default: None (serve until stopped)
    pub fn serve_timeout(mut self, timeout: Duration) -> Self {
        self.serve_timeout = Some(timeout);
        self
    }

    /// Sets how the device is pointed at the manifest.
    pub fn install_mode(mut self, mode: InstallMode) -> Self {
        self.install_mode = Some(mode);
        self
    }

    /// Sets the identity storage directory.
    ///
    /// Default: platform data directory + `ipa_downgrader`
    pub fn state_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.state_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the scratch directory.
    ///
    /// Default: a fresh `ipa-downgrader-<uuid>` directory under the system temp dir
    pub fn work_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.work_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint is not a valid URL or no state
    /// directory can be determined.
    pub fn build(self) -> Result<Settings, SettingsError> {
        let auth_url = parse_url("auth", self.auth_url.as_deref().unwrap_or(DEFAULT_AUTH_URL))?;
        let download_url = parse_url(
            "download",
            self.download_url.as_deref().unwrap_or(DEFAULT_DOWNLOAD_URL),
        )?;
        let mirror_url = parse_url(
            "mirror",
            &ensure_trailing_slash(self.mirror_url.as_deref().unwrap_or(DEFAULT_MIRROR_URL)),
        )?;
        let manifest_service = self
            .manifest_service
            .unwrap_or_else(|| DEFAULT_MANIFEST_SERVICE.to_string());
        parse_url("manifest service", &manifest_service)?;

        let state_dir = match self.state_dir {
            Some(dir) => dir,
            None => dirs::data_local_dir()
                .map(|dir| dir.join("ipa_downgrader"))
                .ok_or(SettingsError::NoStateDir)?,
        };
        let work_dir = self.work_dir.unwrap_or_else(|| {
            std::env::temp_dir().join(format!("ipa-downgrader-{}", uuid::Uuid::new_v4()))
        });

        let download_retry = RetryConfig {
            max_retries: self.download_retries.unwrap_or(0),
            ..RetryConfig::default()
        };

        Ok(Settings::new(
            auth_url,
            download_url,
            mirror_url,
            manifest_service,
            self.user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            self.request_timeout.unwrap_or(Duration::from_secs(60)),
            download_retry,
            self.bind_host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            self.port.unwrap_or(DEFAULT_PORT),
            self.serve_timeout,
            self.install_mode.unwrap_or_default(),
            state_dir,
            work_dir,
        ))
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, SettingsError> {
    Url::parse(value).map_err(|e| SettingsError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

// Url::join replaces the last segment unless the base ends with '/'.
fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
