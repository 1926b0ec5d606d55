//! Handing the install URL to the operating system.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::sync::LazyLock;

/// URL openers tried in order.
const OPENERS: &[&str] = &["xdg-open", "open", "uiopen"];

/// Path of the first URL opener found in `PATH`, looked up once.
static URL_OPENER: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    OPENERS.iter().find_map(|name| match which::which(name) {
        Ok(path) => {
            log::debug!("Found URL opener at: {}", path.display());
            Some(path)
        }
        Err(e) => {
            log::debug!("{name} not found in PATH: {e}");
            None
        }
    })
});

/// The OS primitive that opens a URL and thereby starts the install.
#[async_trait]
pub trait InstallTrigger: Send + Sync {
    /// Opens `url`.
    async fn open(&self, url: &str) -> io::Result<()>;
}

/// Runs a URL opener command.
#[derive(Debug, Clone)]
pub struct CommandTrigger {
    program: PathBuf,
}

impl CommandTrigger {
    /// Uses `program` to open URLs.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses the platform's URL opener, if one is installed.
    pub fn detect() -> Option<Self> {
        URL_OPENER.clone().map(Self::new)
    }
}

#[async_trait]
impl InstallTrigger for CommandTrigger {
    async fn open(&self, url: &str) -> io::Result<()> {
        log::info!("Opening {url} with {}", self.program.display());
        let status = tokio::process::Command::new(&self.program)
            .arg(url)
            .kill_on_drop(true)
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "{} exited with {status}",
                self.program.display()
            )))
        }
    }
}

/// Only logs the URL; the user opens it on the device.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualTrigger;

#[async_trait]
impl InstallTrigger for ManualTrigger {
    async fn open(&self, url: &str) -> io::Result<()> {
        log::info!("Open {url} on the device to start the install");
        Ok(())
    }
}
