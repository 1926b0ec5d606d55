//! Local distribution server.
//!
//! Serves one repackaged artifact on the loopback interface for as long as
//! one install takes, together with a page that sends the device to the
//! install manifest. The manifest itself is generated by an external
//! service from the query string built in [`manifest`].

pub mod manifest;
mod page;
pub mod trigger;

pub use manifest::{ARTIFACT_PATH, INSTALL_PAGE_PATH, manifest_url};
pub use page::render_install_page;
pub use trigger::{CommandTrigger, InstallTrigger, ManualTrigger};

use crate::downgrader::error::ServerError;
use crate::downgrader::settings::{InstallMode, Settings};
use crate::downgrader::types::RepackagedArtifact;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

/// Starts distribution servers.
#[derive(Debug, Clone)]
pub struct DistributionServer {
    settings: Settings,
}

#[derive(Clone)]
struct ServeState {
    artifact: Arc<PathBuf>,
    install_page: Arc<String>,
}

impl DistributionServer {
    /// Creates a server bound per `settings`.
    pub fn new(settings: &Settings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Binds the port and starts serving `artifact`.
    ///
    /// Fails with [`ServerError::PortInUse`] when another server (or a
    /// previous install that is still being served) owns the port.
    pub async fn start(&self, artifact: &RepackagedArtifact) -> Result<ServerHandle, ServerError> {
        let addr = self.settings.bind_addr();
        let listener = TcpListener::bind(addr).await.map_err(|source| bind_error(addr, source))?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| bind_error(addr, source))?;

        let manifest_url = manifest_url(
            self.settings.manifest_service(),
            &artifact.bundle_id,
            &artifact.bundle_version,
            local_addr.port(),
        );
        let install_page =
            render_install_page(&artifact.bundle_id, &artifact.bundle_version, &manifest_url)?;

        let state = ServeState {
            artifact: Arc::new(artifact.path.clone()),
            install_page: Arc::new(install_page),
        };
        let app = Router::new()
            .route(ARTIFACT_PATH, get(serve_artifact))
            .route(INSTALL_PAGE_PATH, get(serve_install_page))
            .with_state(state);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(signal.cancelled_owned())
                .await
        });

        if let Some(limit) = self.settings.serve_timeout() {
            let timer = shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = timer.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        log::info!("Serve timeout of {limit:?} reached, stopping");
                        timer.cancel();
                    }
                }
            });
        }

        log::info!(
            "Serving {} on http://{local_addr}{ARTIFACT_PATH}",
            artifact.path.display()
        );
        Ok(ServerHandle {
            local_addr,
            manifest_url,
            shutdown,
            task,
        })
    }
}

/// A running server.
///
/// Dropping the handle does not stop the server; call [`stop`](Self::stop)
/// or use a [`StopHandle`].
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    manifest_url: String,
    shutdown: CancellationToken,
    task: JoinHandle<io::Result<()>>,
}

/// Stops a server from another task.
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    /// Begins graceful shutdown.
    pub fn stop(&self) {
        self.0.cancel();
    }
}

impl ServerHandle {
    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `itms-services` URL for the served artifact.
    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    /// Device-local URL of the install page.
    pub fn install_page_url(&self) -> String {
        format!("http://127.0.0.1:{}{INSTALL_PAGE_PATH}", self.local_addr.port())
    }

    /// Device-local URL of the artifact.
    pub fn artifact_url(&self) -> String {
        manifest::artifact_url(self.local_addr.port())
    }

    /// URL the device should open for `mode`.
    pub fn trigger_url(&self, mode: InstallMode) -> String {
        match mode {
            InstallMode::InstallPage => self.install_page_url(),
            InstallMode::DirectManifest => self.manifest_url.clone(),
        }
    }

    /// Handle that can stop the server after this one is moved into
    /// [`wait`](Self::wait).
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.shutdown.clone())
    }

    /// Begins graceful shutdown.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Blocks until the server has stopped.
    pub async fn wait(self) -> Result<(), ServerError> {
        let result = self
            .task
            .await
            .map_err(|e| ServerError::Serve(io::Error::other(e)))?;
        result.map_err(ServerError::Serve)?;
        log::info!("Distribution server on {} stopped", self.local_addr);
        Ok(())
    }
}

fn bind_error(addr: SocketAddr, source: io::Error) -> ServerError {
    if source.kind() == io::ErrorKind::AddrInUse {
        ServerError::PortInUse { port: addr.port() }
    } else {
        ServerError::BindFailed {
            addr: addr.to_string(),
            source,
        }
    }
}

async fn serve_artifact(State(state): State<ServeState>) -> Response {
    let file = match tokio::fs::File::open(state.artifact.as_path()).await {
        Ok(file) => file,
        Err(e) => {
            log::error!("Cannot serve {}: {e}", state.artifact.display());
            return (StatusCode::NOT_FOUND, "artifact unavailable").into_response();
        }
    };
    let len = file.metadata().await.ok().map(|m| m.len());
    log::info!("Device requested {ARTIFACT_PATH}");

    let mut response = (
        [(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response();
    if let Some(len) = len {
        response
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    response
}

async fn serve_install_page(State(state): State<ServeState>) -> Html<String> {
    log::info!("Device requested {INSTALL_PAGE_PATH}");
    Html(state.install_page.as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downgrader::settings::SettingsBuilder;
    use std::time::Duration;

    fn artifact(dir: &std::path::Path, bytes: &[u8]) -> RepackagedArtifact {
        let path = dir.join("app-signed.ipa");
        std::fs::write(&path, bytes).unwrap();
        RepackagedArtifact {
            path,
            bundle_id: "com.example.app".into(),
            bundle_version: "2.3.1".into(),
            size: bytes.len() as u64,
            checksum: String::new(),
        }
    }

    fn settings(port: u16) -> Settings {
        SettingsBuilder::new()
            .port(port)
            .state_dir("/tmp/unused")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn serves_artifact_bytes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        let artifact = artifact(dir.path(), &payload);

        let handle = DistributionServer::new(&settings(0))
            .start(&artifact)
            .await
            .unwrap();

        let response = reqwest::get(format!("http://{}{ARTIFACT_PATH}", handle.local_addr()))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()[CONTENT_TYPE.as_str()],
            "application/octet-stream"
        );
        assert_eq!(response.bytes().await.unwrap().as_ref(), payload.as_slice());

        handle.stop();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn install_page_points_at_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let handle = DistributionServer::new(&settings(0))
            .start(&artifact(dir.path(), b"ipa"))
            .await
            .unwrap();

        let port = handle.local_addr().port();
        assert!(handle.manifest_url().ends_with(&format!("127.0.0.1%3A{port}%2Fsigned.ipa")));
        assert_eq!(handle.trigger_url(InstallMode::InstallPage), handle.install_page_url());
        assert_eq!(
            handle.trigger_url(InstallMode::DirectManifest),
            handle.manifest_url()
        );

        let html = reqwest::get(format!("http://{}{INSTALL_PAGE_PATH}", handle.local_addr()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(html.contains(handle.manifest_url()));

        handle.stop_handle().stop();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn second_bind_reports_port_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact(dir.path(), b"ipa");
        let first = DistributionServer::new(&settings(0))
            .start(&artifact)
            .await
            .unwrap();
        let port = first.local_addr().port();

        let err = DistributionServer::new(&settings(port))
            .start(&artifact)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::PortInUse { port: p } if p == port));

        first.stop();
        first.wait().await.unwrap();
    }

    #[tokio::test]
    async fn serve_timeout_stops_server() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsBuilder::new()
            .port(0)
            .serve_timeout(Duration::from_millis(100))
            .state_dir("/tmp/unused")
            .build()
            .unwrap();
        let handle = DistributionServer::new(&settings)
            .start(&artifact(dir.path(), b"ipa"))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("server did not stop on its own")
            .unwrap();
    }
}
