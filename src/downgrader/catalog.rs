//! Version discovery.
//!
//! Two independent sources list historical releases of a package:
//! the private store protocol (authenticated, ids only plus the current
//! release's label) and a public mirror (anonymous, labelled).

use crate::downgrader::error::CatalogError;
use crate::downgrader::protocol::{self, ProtocolError};
use crate::downgrader::settings::Settings;
use crate::downgrader::types::{SessionContext, VersionDescriptor};
use crate::downgrader::utils::http::{download_client, store_client};
use plist::Value;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Lists the releases of a package.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    settings: Settings,
    store: Client,
    mirror: Client,
}

impl CatalogClient {
    /// Creates a client for the endpoints in `settings`.
    pub fn new(settings: &Settings) -> Result<Self> {
        let store =
            store_client(settings, None).map_err(|e| CatalogError::Transport(e.to_string()))?;
        let mirror =
            download_client(settings).map_err(|e| CatalogError::Transport(e.to_string()))?;
        Ok(Self {
            settings: settings.clone(),
            store,
            mirror,
        })
    }

    /// Lists versions through the private protocol, in store order.
    ///
    /// Only the current release carries a human-readable label; every
    /// other entry displays its id.
    pub async fn list_versions_private(
        &self,
        session: &SessionContext,
        package_id: &str,
    ) -> Result<Vec<VersionDescriptor>> {
        log::info!("Listing versions of app {package_id} from the store");
        let response =
            protocol::download_product(&self.store, &self.settings, session, package_id, None)
                .await
                .map_err(catalog_error)?;

        if protocol::is_cancelled(&response) {
            return Err(CatalogError::RemoteRejected {
                message: protocol::customer_message(&response)
                    .unwrap_or_else(|| "lookup cancelled by the store".into()),
            });
        }

        let Some(metadata) = protocol::first_song(&response)
            .and_then(|song| song.get("metadata"))
            .and_then(Value::as_dictionary)
        else {
            return Err(no_versions(package_id));
        };

        let current_id = metadata
            .get("softwareVersionExternalIdentifier")
            .and_then(protocol::scalar_to_string);
        let current_label = metadata
            .get("bundleShortVersionString")
            .and_then(Value::as_string);

        let ids = metadata
            .get("softwareVersionExternalIdentifiers")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(protocol::scalar_to_string))
            .into_iter()
            .flatten();

        let versions = dedup(ids.map(|id| {
            let display_version = match (&current_id, current_label) {
                (Some(current), Some(label)) if *current == id => label.to_string(),
                _ => id.clone(),
            };
            VersionDescriptor {
                external_id: id,
                display_version,
            }
        }));

        if versions.is_empty() {
            return Err(no_versions(package_id));
        }
        log::debug!("Store lists {} versions of app {package_id}", versions.len());
        Ok(versions)
    }

    /// Lists versions from the public mirror, in mirror order.
    pub async fn list_versions_public(&self, package_id: &str) -> Result<Vec<VersionDescriptor>> {
        let url = self
            .settings
            .mirror_url()
            .join(package_id)
            .map_err(|e| CatalogError::InvalidResponse(format!("bad package id: {e}")))?;
        log::info!("Listing versions of app {package_id} from {url}");

        let history: MirrorHistory = self
            .mirror
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CatalogError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;

        let versions = dedup(history.data.into_iter().map(|entry| {
            let external_id = entry.external_identifier.into_string();
            let display_version = entry
                .bundle_version
                .map(Scalar::into_string)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| external_id.clone());
            VersionDescriptor {
                external_id,
                display_version,
            }
        }));

        if versions.is_empty() {
            return Err(no_versions(package_id));
        }
        Ok(versions)
    }
}

#[derive(Debug, Deserialize)]
struct MirrorHistory {
    #[serde(default)]
    data: Vec<MirrorEntry>,
}

#[derive(Debug, Deserialize)]
struct MirrorEntry {
    bundle_version: Option<Scalar>,
    external_identifier: Scalar,
}

/// The mirror is inconsistent about quoting numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// Drops repeated ids, keeping the first occurrence.
fn dedup(versions: impl Iterator<Item = VersionDescriptor>) -> Vec<VersionDescriptor> {
    let mut seen = HashSet::new();
    versions
        .filter(|v| seen.insert(v.external_id.clone()))
        .collect()
}

fn no_versions(package_id: &str) -> CatalogError {
    CatalogError::NoVersionsFound {
        package_id: package_id.to_string(),
    }
}

fn catalog_error(e: ProtocolError) -> CatalogError {
    match e {
        ProtocolError::Transport(detail) => CatalogError::Transport(detail),
        ProtocolError::InvalidResponse(detail) => CatalogError::InvalidResponse(detail),
    }
}
