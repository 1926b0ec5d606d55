//! Download resolution and artifact transfer.

use crate::downgrader::error::FetchError;
use crate::downgrader::protocol::{self, ProtocolError};
use crate::downgrader::settings::Settings;
use crate::downgrader::types::{DownloadDescriptor, SessionContext};
use crate::downgrader::utils::fs::{commit_staged, remove_file, staging_path};
use crate::downgrader::utils::http::{download_client, store_client};
use futures_lite::StreamExt;
use plist::{Dictionary, Value};
use reqwest::Client;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Resolves and downloads package archives.
#[derive(Debug, Clone)]
pub struct PackageFetcher {
    settings: Settings,
    store: Client,
    download: Client,
}

impl PackageFetcher {
    /// Creates a fetcher for the endpoints in `settings`.
    pub fn new(settings: &Settings) -> Result<Self> {
        let store =
            store_client(settings, None).map_err(|e| FetchError::Transport(e.to_string()))?;
        let download =
            download_client(settings).map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            settings: settings.clone(),
            store,
            download,
        })
    }

    /// Asks the store where to download `version_id` of `package_id`.
    ///
    /// `None` requests the current release.
    pub async fn resolve_download(
        &self,
        session: &SessionContext,
        package_id: &str,
        version_id: Option<&str>,
    ) -> Result<DownloadDescriptor> {
        let response = protocol::download_product(
            &self.store,
            &self.settings,
            session,
            package_id,
            version_id,
        )
        .await
        .map_err(fetch_error)?;

        if protocol::is_cancelled(&response) {
            return Err(FetchError::RemoteRejected {
                message: protocol::customer_message(&response)
                    .unwrap_or_else(|| "download cancelled by the store".into()),
            });
        }

        let song = protocol::first_song(&response).ok_or_else(|| FetchError::RemoteRejected {
            message: protocol::customer_message(&response)
                .unwrap_or_else(|| "the store offered no download".into()),
        })?;

        let descriptor = descriptor_from_song(song, package_id, version_id)?;
        log::info!(
            "Resolved app {package_id} version {} ({} entitlement blob(s))",
            version_id.unwrap_or("current"),
            descriptor.entitlement_blobs.len()
        );
        Ok(descriptor)
    }

    /// Downloads the archive to `destination`, replacing any existing file.
    ///
    /// The body is streamed to a sibling `.part` file first, so
    /// `destination` only ever holds a complete archive. Returns the number
    /// of bytes written.
    pub async fn fetch_artifact(
        &self,
        descriptor: &DownloadDescriptor,
        destination: &Path,
    ) -> Result<u64> {
        let retry = self.settings.download_retry();
        let mut attempt = 0;
        loop {
            match self.transfer(&descriptor.url, destination).await {
                Ok(size) => return Ok(size),
                Err(FetchError::Transport(detail)) if attempt < retry.max_retries => {
                    attempt += 1;
                    let delay = retry.backoff_delay(attempt);
                    log::warn!(
                        "Download failed ({detail}), retry {attempt}/{} in {delay:?}",
                        retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn transfer(&self, url: &str, destination: &Path) -> Result<u64> {
        let staging = staging_path(destination);
        let result = self.stream_to(url, &staging).await;
        let size = match result {
            Ok(size) => size,
            Err(e) => {
                if let Err(cleanup) = remove_file(&staging).await {
                    log::debug!("Could not remove {}: {cleanup}", staging.display());
                }
                return Err(e);
            }
        };

        commit_staged(&staging, destination)
            .await
            .map_err(|source| storage(destination, source))?;
        log::info!("Downloaded {size} bytes to {}", destination.display());
        Ok(size)
    }

    async fn stream_to(&self, url: &str, staging: &Path) -> Result<u64> {
        if let Some(parent) = staging.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| storage(parent, source))?;
        }

        log::debug!("Downloading {url}");
        let response = self
            .download
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(staging)
            .await
            .map_err(|source| storage(staging, source))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Transport(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|source| storage(staging, source))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|source| storage(staging, source))?;
        Ok(written)
    }
}

fn descriptor_from_song(
    song: &Dictionary,
    package_id: &str,
    version_id: Option<&str>,
) -> Result<DownloadDescriptor> {
    let url = song
        .get("URL")
        .and_then(Value::as_string)
        .ok_or_else(|| FetchError::InvalidResponse("download entry has no URL".into()))?;

    let entitlement_blobs = song
        .get("sinfs")
        .and_then(Value::as_array)
        .map(|sinfs| {
            sinfs
                .iter()
                .filter_map(Value::as_dictionary)
                .filter_map(|entry| entry.get("sinf").and_then(Value::as_data))
                .map(<[u8]>::to_vec)
                .collect()
        })
        .unwrap_or_default();

    let metadata = song
        .get("metadata")
        .and_then(Value::as_dictionary)
        .cloned()
        .unwrap_or_default();

    Ok(DownloadDescriptor {
        package_id: package_id.to_string(),
        version_id: version_id.map(str::to_string),
        url: url.to_string(),
        entitlement_blobs,
        metadata,
    })
}

fn storage(path: &Path, source: std::io::Error) -> FetchError {
    FetchError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

fn fetch_error(e: ProtocolError) -> FetchError {
    match e {
        ProtocolError::Transport(detail) => FetchError::Transport(detail),
        ProtocolError::InvalidResponse(detail) => FetchError::InvalidResponse(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downgrader::settings::SettingsBuilder;
    use httpmock::prelude::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn session() -> SessionContext {
        SessionContext {
            apple_id: "user@example.com".into(),
            guid: "008056E3D99E".into(),
            headers: BTreeMap::new(),
            cookies: Vec::new(),
            account_name: "Jane Appleseed".into(),
            created_at: chrono::Utc::now(),
        }
    }

    fn fetcher_for(server: &MockServer, retries: u32) -> PackageFetcher {
        let settings = SettingsBuilder::new()
            .download_url(server.url("/download"))
            .download_retries(retries)
            .state_dir("/tmp/unused")
            .build()
            .unwrap();
        PackageFetcher::new(&settings).unwrap()
    }

    fn plist_bytes(dict: Dictionary) -> Vec<u8> {
        let mut out = Vec::new();
        plist::to_writer_xml(&mut out, &Value::Dictionary(dict)).unwrap();
        out
    }

    fn descriptor(url: String) -> DownloadDescriptor {
        DownloadDescriptor {
            package_id: "1".into(),
            version_id: None,
            url,
            entitlement_blobs: Vec::new(),
            metadata: Dictionary::new(),
        }
    }

    #[tokio::test]
    async fn resolve_reads_url_blobs_and_metadata() {
        let server = MockServer::start_async().await;

        let mut sinf = Dictionary::new();
        sinf.insert("id".into(), Value::Integer(0.into()));
        sinf.insert("sinf".into(), Value::Data(vec![0xde, 0xad]));
        let mut metadata = Dictionary::new();
        metadata.insert("bundleDisplayName".into(), Value::String("Example".into()));
        let mut song = Dictionary::new();
        song.insert("URL".into(), Value::String("https://cdn.example/app.ipa".into()));
        song.insert("sinfs".into(), Value::Array(vec![Value::Dictionary(sinf)]));
        song.insert("metadata".into(), Value::Dictionary(metadata));
        let mut body = Dictionary::new();
        body.insert("songList".into(), Value::Array(vec![Value::Dictionary(song)]));
        let body = plist_bytes(body);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/download")
                    .body_contains("<key>externalVersionId</key>");
                then.status(200).body(&body);
            })
            .await;

        let descriptor = fetcher_for(&server, 0)
            .resolve_download(&session(), "544007664", Some("861234"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(descriptor.url, "https://cdn.example/app.ipa");
        assert_eq!(descriptor.entitlement_blobs, vec![vec![0xde, 0xad]]);
        assert_eq!(descriptor.version_id.as_deref(), Some("861234"));
        assert!(descriptor.metadata.contains_key("bundleDisplayName"));
    }

    #[tokio::test]
    async fn resolve_surfaces_store_refusal() {
        let server = MockServer::start_async().await;
        let mut body = Dictionary::new();
        body.insert("cancel-purchase-batch".into(), Value::Boolean(true));
        body.insert("customerMessage".into(), Value::String("License not found.".into()));
        let body = plist_bytes(body);
        server
            .mock_async(|when, then| {
                when.method(POST).path("/download");
                then.status(200).body(&body);
            })
            .await;

        let err = fetcher_for(&server, 0)
            .resolve_download(&session(), "1", None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::RemoteRejected { ref message } if message == "License not found.")
        );
    }

    #[tokio::test]
    async fn fetch_replaces_existing_file() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/app.ipa");
                then.status(200).body(b"fresh archive bytes");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("app.ipa");
        std::fs::write(&destination, b"stale").unwrap();

        let size = fetcher_for(&server, 0)
            .fetch_artifact(&descriptor(server.url("/app.ipa")), &destination)
            .await
            .unwrap();

        assert_eq!(size, 19);
        assert_eq!(std::fs::read(&destination).unwrap(), b"fresh archive bytes");
        assert!(!staging_path(&destination).exists());
    }

    #[tokio::test]
    async fn failed_fetch_fails_fast_and_keeps_nothing() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/app.ipa");
                then.status(404);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("app.ipa");
        let err = fetcher_for(&server, 0)
            .fetch_artifact(&descriptor(server.url("/app.ipa")), &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)));
        mock.assert_hits_async(1).await;
        assert!(!destination.exists());
        assert!(!staging_path(&destination).exists());
    }

    #[tokio::test]
    async fn error_status_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/app.ipa");
                then.status(503);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher_for(&server, 1)
            .fetch_artifact(&descriptor(server.url("/app.ipa")), &dir.path().join("app.ipa"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 503 }));
        mock.assert_hits_async(1).await;
        assert!(!dir.path().join("app.ipa.part").exists());
    }

    #[tokio::test]
    async fn configured_retries_repeat_dropped_transfer() {
        // Accepts and immediately closes every connection.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });

        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher_for(&server, 1)
            .fetch_artifact(
                &descriptor(format!("http://{addr}/app.ipa")),
                &dir.path().join("app.ipa"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)), "{err:?}");
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unwritable_destination_is_storage_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/app.ipa");
                then.status(200).body(b"bytes");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = fetcher_for(&server, 0)
            .fetch_artifact(&descriptor(server.url("/app.ipa")), &blocker.join("app.ipa"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Storage { .. }));
    }
}
