//! App bundle discovery, `Info.plist` and `iTunesMetadata.plist`.

use crate::downgrader::error::{ErrorExt, RepackageError, RepackageStep};
use plist::{Dictionary, Value};
use std::path::{Path, PathBuf};

/// Directory holding the app bundle inside an unpacked archive.
pub const PAYLOAD_DIR: &str = "Payload";

/// Store metadata file written next to `Payload/`.
pub const METADATA_FILE: &str = "iTunesMetadata.plist";

/// Fields of a bundle's `Info.plist` that repackaging needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    /// `CFBundleIdentifier`
    pub identifier: String,
    /// `CFBundleShortVersionString`
    pub short_version: String,
    /// `CFBundleExecutable`, needed only for the legacy entitlement path
    pub executable: Option<String>,
}

/// Returns the first `*.app` directory under `Payload/`, in name order.
pub(super) fn locate_bundle(unpack_dir: &Path) -> Result<PathBuf, RepackageError> {
    let step = RepackageStep::LocateBundle;
    let payload = unpack_dir.join(PAYLOAD_DIR);
    if !payload.is_dir() {
        return Err(RepackageError::malformed(step, "archive has no Payload directory"));
    }

    let mut bundles: Vec<PathBuf> = std::fs::read_dir(&payload)
        .fs_context(step, &payload)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir() && path.extension().is_some_and(|ext| ext == "app"))
        .collect();
    bundles.sort();

    bundles
        .into_iter()
        .next()
        .ok_or_else(|| RepackageError::malformed(step, "no .app bundle under Payload"))
}

impl BundleInfo {
    /// Reads `<bundle>/Info.plist`.
    pub(super) fn read(bundle: &Path) -> Result<Self, RepackageError> {
        let step = RepackageStep::ReadBundleInfo;
        let path = bundle.join("Info.plist");
        if !path.is_file() {
            return Err(RepackageError::malformed(step, "bundle has no Info.plist"));
        }
        let info = Value::from_file(&path)
            .map_err(|e| RepackageError::malformed(step, format!("unreadable Info.plist: {e}")))?;
        let info = info
            .as_dictionary()
            .ok_or_else(|| RepackageError::malformed(step, "Info.plist is not a dictionary"))?;

        let required = |key: &str| {
            info.get(key)
                .and_then(Value::as_string)
                .map(str::to_string)
                .ok_or_else(|| RepackageError::malformed(step, format!("Info.plist lacks {key}")))
        };

        Ok(Self {
            identifier: required("CFBundleIdentifier")?,
            short_version: required("CFBundleShortVersionString")?,
            executable: info
                .get("CFBundleExecutable")
                .and_then(Value::as_string)
                .map(str::to_string),
        })
    }
}

/// Writes the store metadata, stamped with the account, as
/// `<unpack_dir>/iTunesMetadata.plist`.
pub(super) fn write_metadata(
    unpack_dir: &Path,
    metadata: &Dictionary,
    account_id: &str,
) -> Result<PathBuf, RepackageError> {
    let step = RepackageStep::WriteMetadata;
    let mut stamped = metadata.clone();
    stamped.insert("apple-id".into(), Value::String(account_id.to_string()));
    stamped.insert("userName".into(), Value::String(account_id.to_string()));

    let path = unpack_dir.join(METADATA_FILE);
    Value::Dictionary(stamped)
        .to_file_xml(&path)
        .map_err(|e| RepackageError::IoFailure {
            step,
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_info(bundle: &Path, entries: &[(&str, &str)]) {
        let mut info = Dictionary::new();
        for (key, value) in entries {
            info.insert((*key).into(), Value::String((*value).into()));
        }
        std::fs::create_dir_all(bundle).unwrap();
        Value::Dictionary(info)
            .to_file_binary(bundle.join("Info.plist"))
            .unwrap();
    }

    #[test]
    fn locates_first_bundle_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Payload/Zeta.app")).unwrap();
        std::fs::create_dir_all(dir.path().join("Payload/Alpha.app")).unwrap();
        std::fs::write(dir.path().join("Payload/readme.app"), b"file, not bundle").unwrap();

        let bundle = locate_bundle(dir.path()).unwrap();
        assert!(bundle.ends_with("Payload/Alpha.app"));
    }

    #[test]
    fn missing_bundle_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_bundle(dir.path()).unwrap_err();
        assert_eq!(err.step(), RepackageStep::LocateBundle);

        std::fs::create_dir_all(dir.path().join("Payload")).unwrap();
        let err = locate_bundle(dir.path()).unwrap_err();
        assert!(matches!(err, RepackageError::MalformedArchive { .. }));
    }

    #[test]
    fn reads_binary_info_plist() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Example.app");
        write_info(
            &bundle,
            &[
                ("CFBundleIdentifier", "com.example.app"),
                ("CFBundleShortVersionString", "2.3.1"),
                ("CFBundleExecutable", "Example"),
            ],
        );

        let info = BundleInfo::read(&bundle).unwrap();
        assert_eq!(info.identifier, "com.example.app");
        assert_eq!(info.short_version, "2.3.1");
        assert_eq!(info.executable.as_deref(), Some("Example"));
    }

    #[test]
    fn missing_version_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Example.app");
        write_info(&bundle, &[("CFBundleIdentifier", "com.example.app")]);

        let err = BundleInfo::read(&bundle).unwrap_err();
        assert_eq!(err.step(), RepackageStep::ReadBundleInfo);
        assert!(err.to_string().contains("CFBundleShortVersionString"));
    }

    #[test]
    fn metadata_is_stamped_with_account() {
        let dir = tempfile::tempdir().unwrap();
        let mut metadata = Dictionary::new();
        metadata.insert("itemId".into(), Value::Integer(544007664.into()));

        let path = write_metadata(dir.path(), &metadata, "user@example.com").unwrap();
        let written = Value::from_file(path).unwrap().into_dictionary().unwrap();
        assert_eq!(
            written.get("apple-id").and_then(Value::as_string),
            Some("user@example.com")
        );
        assert_eq!(
            written.get("userName").and_then(Value::as_string),
            Some("user@example.com")
        );
        assert!(written.contains_key("itemId"));
    }
}
