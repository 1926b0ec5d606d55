//! Turns a downloaded archive into one the device will install.
//!
//! The pipeline unpacks the archive, stamps the store metadata with the
//! account, drops the per-user entitlement blobs into the bundle and zips
//! the tree back up. Each stage reports itself through [`RepackageStep`]
//! when it fails.

mod archive;
mod bundle;
mod checksum;
mod entitlements;

pub use bundle::{BundleInfo, METADATA_FILE, PAYLOAD_DIR};
pub use checksum::calculate_file_sha256;

use crate::downgrader::error::{ErrorExt, RepackageError, RepackageStep};
use crate::downgrader::types::{DownloadDescriptor, RepackagedArtifact};
use crate::downgrader::utils::fs::{commit_staged, create_dir_all, staging_path};
use std::path::{Path, PathBuf};

/// Result type for repackaging.
pub type Result<T> = std::result::Result<T, RepackageError>;

/// Repackages archives inside one working directory.
#[derive(Debug, Clone)]
pub struct PackageRepackager {
    work_dir: PathBuf,
}

impl PackageRepackager {
    /// Creates a repackager that unpacks and writes under `work_dir`.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Working directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Output path for an archive: `<work_dir>/<stem>-signed.ipa`.
    pub fn output_path(&self, archive: &Path) -> PathBuf {
        self.work_dir
            .join(format!("{}-signed.ipa", archive_stem(archive)))
    }

    /// Repackages `archive` for `account_id` and returns the new artifact.
    ///
    /// Any previous unpack directory or output for the same archive is
    /// replaced; running twice on the same input yields identical bytes.
    pub async fn repackage(
        &self,
        archive: &Path,
        descriptor: &DownloadDescriptor,
        account_id: &str,
    ) -> Result<RepackagedArtifact> {
        let stem = archive_stem(archive);
        let unpack_dir = self.work_dir.join(&stem);
        let output = self.output_path(archive);
        log::info!("Repackaging {} into {}", archive.display(), output.display());

        create_dir_all(&unpack_dir, true)
            .await
            .fs_context(RepackageStep::Unpack, &unpack_dir)?;

        let staging = staging_path(&output);
        let job = RepackageJob {
            archive: archive.to_path_buf(),
            unpack_dir,
            staging: staging.clone(),
            blobs: descriptor.entitlement_blobs.clone(),
            metadata: descriptor.metadata.clone(),
            account_id: account_id.to_string(),
        };
        let info = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| RepackageError::IoFailure {
                step: RepackageStep::Archive,
                path: output.clone(),
                source: std::io::Error::other(format!("repackaging task failed: {e}")),
            })??;
        commit_staged(&staging, &output)
            .await
            .fs_context(RepackageStep::Archive, &output)?;

        let size = tokio::fs::metadata(&output)
            .await
            .fs_context(RepackageStep::Archive, &output)?
            .len();
        let checksum = calculate_file_sha256(&output).await?;
        log::info!(
            "Repackaged {} {} ({size} bytes, sha256 {checksum})",
            info.identifier,
            info.short_version
        );

        Ok(RepackagedArtifact {
            path: output,
            bundle_id: info.identifier,
            bundle_version: info.short_version,
            size,
            checksum,
        })
    }
}

/// Blocking half of the pipeline.
struct RepackageJob {
    archive: PathBuf,
    unpack_dir: PathBuf,
    staging: PathBuf,
    blobs: Vec<Vec<u8>>,
    metadata: plist::Dictionary,
    account_id: String,
}

impl RepackageJob {
    fn run(self) -> Result<BundleInfo> {
        let entries = archive::unpack(&self.archive, &self.unpack_dir)?;
        log::debug!("Unpacked {entries} files into {}", self.unpack_dir.display());

        let bundle = bundle::locate_bundle(&self.unpack_dir)?;
        log::debug!("Found app bundle {}", bundle.display());
        let info = BundleInfo::read(&bundle)?;

        bundle::write_metadata(&self.unpack_dir, &self.metadata, &self.account_id)?;
        let written = entitlements::inject(&bundle, &info, &self.blobs)?;
        log::info!("Injected {} entitlement blob(s)", written.len());

        if let Err(e) = archive::pack(&self.unpack_dir, &self.staging) {
            if let Err(cleanup) = std::fs::remove_file(&self.staging) {
                log::debug!("Could not remove {}: {cleanup}", self.staging.display());
            }
            return Err(e);
        }
        Ok(info)
    }
}

fn archive_stem(archive: &Path) -> String {
    archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "app".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plist::{Dictionary, Value};
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Builds a minimal store archive. `manifest` adds `SC_Info/Manifest.plist`.
    fn build_ipa(path: &Path, manifest: Option<&[&str]>) {
        let mut info = Dictionary::new();
        info.insert("CFBundleIdentifier".into(), Value::String("com.example.app".into()));
        info.insert("CFBundleShortVersionString".into(), Value::String("2.3.1".into()));
        info.insert("CFBundleExecutable".into(), Value::String("Example".into()));
        let mut info_bytes = Vec::new();
        plist::to_writer_binary(&mut info_bytes, &Value::Dictionary(info)).unwrap();

        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        zip.start_file("Payload/Example.app/Info.plist", SimpleFileOptions::default()).unwrap();
        zip.write_all(&info_bytes).unwrap();
        zip.start_file("Payload/Example.app/Example", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"\xcf\xfa\xed\xfe binary").unwrap();

        if let Some(paths) = manifest {
            let mut dict = Dictionary::new();
            dict.insert(
                "SinfPaths".into(),
                Value::Array(paths.iter().map(|p| Value::String((*p).into())).collect()),
            );
            let mut bytes = Vec::new();
            plist::to_writer_xml(&mut bytes, &Value::Dictionary(dict)).unwrap();
            zip.start_file("Payload/Example.app/SC_Info/Manifest.plist", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(&bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    fn descriptor(blobs: Vec<Vec<u8>>) -> DownloadDescriptor {
        let mut metadata = Dictionary::new();
        metadata.insert("itemName".into(), Value::String("Example".into()));
        DownloadDescriptor {
            package_id: "544007664".into(),
            version_id: Some("861234".into()),
            url: "https://cdn.example/app.ipa".into(),
            entitlement_blobs: blobs,
            metadata,
        }
    }

    #[tokio::test]
    async fn repackage_produces_installable_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("app.ipa");
        build_ipa(&archive, Some(&["SC_Info/Example.sinf"]));

        let repackager = PackageRepackager::new(dir.path());
        let artifact = repackager
            .repackage(&archive, &descriptor(vec![vec![0xaa; 16]]), "user@example.com")
            .await
            .unwrap();

        assert_eq!(artifact.path, dir.path().join("app-signed.ipa"));
        assert_eq!(artifact.bundle_id, "com.example.app");
        assert_eq!(artifact.bundle_version, "2.3.1");
        assert_eq!(artifact.size, std::fs::metadata(&artifact.path).unwrap().len());
        assert_eq!(artifact.checksum.len(), 64);

        let mut zip = zip::ZipArchive::new(std::fs::File::open(&artifact.path).unwrap()).unwrap();
        let names: Vec<String> = zip.file_names().map(str::to_string).collect();
        assert!(names.iter().any(|n| n == METADATA_FILE));
        assert!(names.iter().any(|n| n == "Payload/Example.app/SC_Info/Example.sinf"));

        let mut sinf = Vec::new();
        std::io::Read::read_to_end(
            &mut zip.by_name("Payload/Example.app/SC_Info/Example.sinf").unwrap(),
            &mut sinf,
        )
        .unwrap();
        assert_eq!(sinf, vec![0xaa; 16]);
    }

    #[tokio::test]
    async fn repackage_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("app.ipa");
        build_ipa(&archive, None);
        let repackager = PackageRepackager::new(dir.path());
        let descriptor = descriptor(vec![vec![1, 2, 3]]);

        let first = repackager
            .repackage(&archive, &descriptor, "user@example.com")
            .await
            .unwrap();
        let first_bytes = std::fs::read(&first.path).unwrap();
        let second = repackager
            .repackage(&archive, &descriptor, "user@example.com")
            .await
            .unwrap();

        assert_eq!(first.checksum, second.checksum);
        assert_eq!(first_bytes, std::fs::read(&second.path).unwrap());
        assert!(!staging_path(&second.path).exists());
    }

    #[tokio::test]
    async fn archive_without_bundle_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.ipa");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
        zip.start_file("README", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"nothing here").unwrap();
        zip.finish().unwrap();

        let err = PackageRepackager::new(dir.path())
            .repackage(&archive, &descriptor(vec![vec![1]]), "user@example.com")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepackageError::MalformedArchive {
                step: RepackageStep::LocateBundle,
                ..
            }
        ));
        assert!(!dir.path().join("empty-signed.ipa").exists());
    }
}
