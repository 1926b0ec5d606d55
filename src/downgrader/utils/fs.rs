//! File system utilities for unpacking and re-archiving.
//!
//! Provides idempotent directory operations and atomic file replacement.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> io::Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }

    // create_dir_all is already idempotent - succeeds even if dir exists
    fs::create_dir_all(path).await
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Removes a file if it exists.
pub async fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Sibling path used while a file is being produced.
///
/// `app.ipa` becomes `app.ipa.part`; the final name only ever refers to a
/// complete file.
pub fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

/// Moves a fully written staging file over `target`, replacing any
/// existing file.
pub async fn commit_staged(staging: &Path, target: &Path) -> io::Result<()> {
    // rename() does not replace existing files on every platform
    remove_file(target).await?;
    fs::rename(staging, target).await
}
