//! Entitlement blob injection.
//!
//! Current bundles list where their blobs go in `SC_Info/Manifest.plist`
//! (`SinfPaths`, relative to the bundle). Bundles predating the manifest
//! take a single blob at `SC_Info/<CFBundleExecutable>.sinf`.

use super::bundle::BundleInfo;
use crate::downgrader::error::{ErrorExt, RepackageError, RepackageStep};
use plist::Value;
use std::path::{Component, Path, PathBuf};

const SC_INFO_DIR: &str = "SC_Info";
const MANIFEST_FILE: &str = "Manifest.plist";

/// Writes `blobs` into `bundle` and returns the paths written, in order.
pub(super) fn inject(
    bundle: &Path,
    info: &BundleInfo,
    blobs: &[Vec<u8>],
) -> Result<Vec<PathBuf>, RepackageError> {
    if blobs.is_empty() {
        return Err(RepackageError::unsupported("the store supplied no entitlement blobs"));
    }

    let manifest = bundle.join(SC_INFO_DIR).join(MANIFEST_FILE);
    let targets = if manifest.is_file() {
        let paths = sinf_paths(&manifest)?;
        if paths.len() > blobs.len() {
            return Err(RepackageError::unsupported(format!(
                "manifest lists {} entitlement paths but only {} blob(s) were supplied",
                paths.len(),
                blobs.len()
            )));
        }
        paths
    } else {
        let executable = info.executable.as_deref().ok_or_else(|| {
            RepackageError::malformed(
                RepackageStep::InjectEntitlements,
                "Info.plist lacks CFBundleExecutable",
            )
        })?;
        log::info!("No {SC_INFO_DIR}/{MANIFEST_FILE}, using the legacy entitlement path");
        vec![format!("{SC_INFO_DIR}/{executable}.sinf")]
    };

    let mut written = Vec::with_capacity(targets.len());
    for (relative, blob) in targets.iter().zip(blobs) {
        let path = bundle.join(checked_relative(relative)?);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).fs_context(RepackageStep::InjectEntitlements, parent)?;
        }
        std::fs::write(&path, blob).fs_context(RepackageStep::InjectEntitlements, &path)?;
        log::debug!("Wrote entitlement blob to {relative}");
        written.push(path);
    }
    Ok(written)
}

fn sinf_paths(manifest: &Path) -> Result<Vec<String>, RepackageError> {
    let value = Value::from_file(manifest)
        .map_err(|e| RepackageError::unsupported(format!("unreadable {MANIFEST_FILE}: {e}")))?;
    let paths = value
        .as_dictionary()
        .and_then(|dict| dict.get("SinfPaths"))
        .and_then(Value::as_array)
        .ok_or_else(|| RepackageError::unsupported(format!("{MANIFEST_FILE} has no SinfPaths")))?;

    paths
        .iter()
        .map(|p| {
            p.as_string()
                .map(str::to_string)
                .ok_or_else(|| RepackageError::unsupported("SinfPaths entry is not a string"))
        })
        .collect()
}

/// Rejects paths that would land outside the bundle.
fn checked_relative(relative: &str) -> Result<&Path, RepackageError> {
    let path = Path::new(relative);
    let escapes = relative.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(RepackageError::unsupported(format!(
            "entitlement path '{relative}' escapes the bundle"
        )));
    }
    Ok(path)
}
