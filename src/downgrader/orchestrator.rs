//! Drives one downgrade from store download to served install.

use crate::downgrader::error::{Error, Result};
use crate::downgrader::fetch::PackageFetcher;
use crate::downgrader::repackage::PackageRepackager;
use crate::downgrader::serve::{DistributionServer, InstallTrigger, ServerHandle};
use crate::downgrader::settings::Settings;
use crate::downgrader::types::{RepackagedArtifact, SessionContext};
use crate::downgrader::utils::fs;
use std::path::PathBuf;

/// Fetch → repackage → serve pipeline for a single (package, version) pair.
///
/// # Examples
///
/// ```no_run
/// use ipa_downgrader::downgrader::{Downgrader, ManualTrigger, SessionContext, Settings};
///
/// # async fn example(settings: Settings, session: SessionContext) -> ipa_downgrader::downgrader::Result<()> {
/// let downgrader = Downgrader::new(settings)?;
/// let artifact = downgrader.prepare(&session, "544007664", "861234").await?;
/// let server = downgrader.install(&artifact, &ManualTrigger).await?;
/// server.wait().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Downgrader {
    settings: Settings,
    fetcher: PackageFetcher,
    repackager: PackageRepackager,
    server: DistributionServer,
}

impl Downgrader {
    /// Creates the pipeline for `settings`.
    pub fn new(settings: Settings) -> Result<Self> {
        let fetcher = PackageFetcher::new(&settings)?;
        let repackager = PackageRepackager::new(settings.work_dir());
        let server = DistributionServer::new(&settings);
        Ok(Self {
            settings,
            fetcher,
            repackager,
            server,
        })
    }

    /// Settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Downloads `version_id` of `package_id` and repackages it for the
    /// session's account.
    pub async fn prepare(
        &self,
        session: &SessionContext,
        package_id: &str,
        version_id: &str,
    ) -> Result<RepackagedArtifact> {
        let work_dir = self.settings.work_dir();
        fs::create_dir_all(work_dir, false)
            .await
            .map_err(|source| Error::WorkDir {
                path: work_dir.to_path_buf(),
                source,
            })?;

        let descriptor = self
            .fetcher
            .resolve_download(session, package_id, Some(version_id))
            .await?;
        let raw = self.raw_archive_path(package_id, version_id);
        self.fetcher.fetch_artifact(&descriptor, &raw).await?;

        let artifact = self
            .repackager
            .repackage(&raw, &descriptor, &session.apple_id)
            .await?;
        Ok(artifact)
    }

    /// Starts serving `artifact` and hands the install URL to `trigger`.
    ///
    /// A trigger failure is logged, not returned: the URLs on the handle
    /// can still be opened by hand.
    pub async fn install(
        &self,
        artifact: &RepackagedArtifact,
        trigger: &dyn InstallTrigger,
    ) -> Result<ServerHandle> {
        let handle = self.server.start(artifact).await?;
        let url = handle.trigger_url(self.settings.install_mode());
        if let Err(e) = trigger.open(&url).await {
            log::warn!("Could not open {url}: {e}");
        }
        Ok(handle)
    }

    /// Runs the whole pipeline and serves until stopped or timed out.
    pub async fn run(
        &self,
        session: &SessionContext,
        package_id: &str,
        version_id: &str,
        trigger: &dyn InstallTrigger,
    ) -> Result<RepackagedArtifact> {
        let artifact = self.prepare(session, package_id, version_id).await?;
        let handle = self.install(&artifact, trigger).await?;
        handle.wait().await?;
        Ok(artifact)
    }

    /// Removes the work directory and everything in it.
    pub async fn cleanup(&self) -> Result<()> {
        let work_dir = self.settings.work_dir();
        fs::remove_dir_all(work_dir)
            .await
            .map_err(|source| Error::WorkDir {
                path: work_dir.to_path_buf(),
                source,
            })?;
        log::debug!("Removed work directory {}", work_dir.display());
        Ok(())
    }

    fn raw_archive_path(&self, package_id: &str, version_id: &str) -> PathBuf {
        self.settings
            .work_dir()
            .join(format!("{package_id}-{version_id}.ipa"))
    }
}
