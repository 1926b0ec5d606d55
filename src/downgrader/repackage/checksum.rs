//! Artifact checksum calculation.

use crate::downgrader::error::{ErrorExt, RepackageError, RepackageStep};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Calculates the hex SHA-256 of a file, reading it in 8KB chunks.
pub async fn calculate_file_sha256(file_path: &Path) -> Result<String, RepackageError> {
    let mut file = tokio::fs::File::open(file_path)
        .await
        .fs_context(RepackageStep::Archive, file_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context(RepackageStep::Archive, file_path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.ipa");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            calculate_file_sha256(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let err = calculate_file_sha256(Path::new("/nonexistent/artifact.ipa"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/artifact.ipa"));
    }
}
