//! Zip unpacking and deterministic re-archiving.
//!
//! Both functions block and are run from `spawn_blocking`.

use crate::downgrader::error::{ErrorExt, RepackageError, RepackageStep};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Extracts `archive` into `dest_dir`.
///
/// Entries whose names would escape `dest_dir` are skipped.
pub(super) fn unpack(archive: &Path, dest_dir: &Path) -> Result<usize, RepackageError> {
    let step = RepackageStep::Unpack;
    let file = File::open(archive).fs_context(step, archive)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| RepackageError::malformed(step, format!("not a zip archive: {e}")))?;

    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| RepackageError::malformed(step, format!("unreadable entry {i}: {e}")))?;

        let Some(relative) = entry.enclosed_name() else {
            log::warn!("Skipping archive entry with unsafe name: {}", entry.name());
            continue;
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).fs_context(step, &out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).fs_context(step, parent)?;
        }
        let mut out = File::create(&out_path).fs_context(step, &out_path)?;
        io::copy(&mut entry, &mut out).fs_context(step, &out_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o777))
                    .fs_context(step, &out_path)?;
            }
        }
        extracted += 1;
    }

    Ok(extracted)
}

/// Archives the contents of `source_dir` into `output`.
///
/// Entries are written in sorted order with a fixed timestamp, so the same
/// tree always yields the same bytes. `output` must not be inside
/// `source_dir`.
pub(super) fn pack(source_dir: &Path, output: &Path) -> Result<(), RepackageError> {
    let step = RepackageStep::Archive;
    let file = File::create(output).fs_context(step, output)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source_dir).to_path_buf();
            RepackageError::IoFailure {
                step,
                path,
                source: e.into_io_error().unwrap_or_else(|| io::Error::other("walk failed")),
            }
        })?;
        let name = entry_name(source_dir, entry.path())?;

        if entry.file_type().is_dir() {
            zip.add_directory(name, entry_options(0o755))
                .map_err(|e| zip_failure(entry.path(), e))?;
            continue;
        }

        zip.start_file(name, entry_options(file_mode(entry.path())?))
            .map_err(|e| zip_failure(entry.path(), e))?;
        let mut input = File::open(entry.path()).fs_context(step, entry.path())?;
        io::copy(&mut input, &mut zip).fs_context(step, entry.path())?;
    }

    let mut writer = zip.finish().map_err(|e| zip_failure(output, e))?;
    io::Write::flush(&mut writer).fs_context(step, output)?;
    Ok(())
}

fn entry_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(mode)
}

/// Forward-slash path of `path` relative to `root`, as zip requires.
fn entry_name(root: &Path, path: &Path) -> Result<String, RepackageError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        RepackageError::malformed(
            RepackageStep::Archive,
            format!("{} is outside {}", path.display(), root.display()),
        )
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<u32, RepackageError> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path).fs_context(RepackageStep::Archive, path)?;
    Ok(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Result<u32, RepackageError> {
    Ok(0o644)
}

fn zip_failure(path: &Path, e: zip::result::ZipError) -> RepackageError {
    RepackageError::IoFailure {
        step: RepackageStep::Archive,
        path: path.to_path_buf(),
        source: io::Error::other(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack_preserves_tree() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        std::fs::create_dir_all(source.join("Payload/Example.app/SC_Info")).unwrap();
        std::fs::write(source.join("Payload/Example.app/Info.plist"), b"plist").unwrap();
        std::fs::write(source.join("iTunesMetadata.plist"), b"meta").unwrap();

        let archive = dir.path().join("out.ipa");
        pack(&source, &archive).unwrap();

        let dest = dir.path().join("dest");
        assert_eq!(unpack(&archive, &dest).unwrap(), 2);
        assert_eq!(
            std::fs::read(dest.join("Payload/Example.app/Info.plist")).unwrap(),
            b"plist"
        );
        assert!(dest.join("Payload/Example.app/SC_Info").is_dir());
    }

    #[test]
    fn pack_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        std::fs::create_dir_all(source.join("b")).unwrap();
        std::fs::write(source.join("b/z.txt"), b"z").unwrap();
        std::fs::write(source.join("a.txt"), b"a").unwrap();

        let first = dir.path().join("first.zip");
        let second = dir.path().join("second.zip");
        pack(&source, &first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        pack(&source, &second).unwrap();

        assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
    }

    #[test]
    fn unpack_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ipa");
        std::fs::write(&bogus, b"definitely not a zip").unwrap();

        let err = unpack(&bogus, &dir.path().join("out")).unwrap_err();
        assert!(matches!(
            err,
            RepackageError::MalformedArchive {
                step: RepackageStep::Unpack,
                ..
            }
        ));
    }
}
