//! Data carried between the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Store account credentials.
///
/// `guid` is derived from `apple_id` on first sign-in when absent and is
/// then persisted with the rest of the identity.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    /// Account e-mail
    pub apple_id: String,
    /// Account password, without any two-factor code
    pub password: String,
    /// Pseudo-device identifier sent with every store request
    pub guid: Option<String>,
}

impl Credential {
    /// Creates credentials with no GUID yet.
    pub fn new(apple_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            apple_id: apple_id.into(),
            password: password.into(),
            guid: None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("apple_id", &self.apple_id)
            .field("password", &"<redacted>")
            .field("guid", &self.guid)
            .finish()
    }
}

/// A cookie captured from the store during sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain attribute, when the store set one
    pub domain: Option<String>,
}

/// Authenticated request context.
///
/// Only produced by a successful sign-in (or restored from the vault) and
/// discarded wholesale on logout.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
    /// Account the session belongs to
    pub apple_id: String,
    /// GUID the session was established with
    pub guid: String,
    /// Headers attached to every authenticated store request
    pub headers: BTreeMap<String, String>,
    /// Cookies returned by the store during sign-in
    pub cookies: Vec<Cookie>,
    /// Display name of the account holder
    pub account_name: String,
    /// When the session was established
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    /// Renders the captured cookies as a `Cookie` request header value.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("apple_id", &self.apple_id)
            .field("guid", &self.guid)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("cookies", &self.cookies.len())
            .field("account_name", &self.account_name)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// One historical release of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDescriptor {
    /// Opaque store identifier used to request this release
    pub external_id: String,
    /// Human-readable version, or the id itself when the source has none
    pub display_version: String,
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.display_version == self.external_id {
            write!(f, "{}", self.external_id)
        } else {
            write!(f, "{} ({})", self.display_version, self.external_id)
        }
    }
}

/// Where and how to fetch one (package, version) pair.
#[derive(Debug, Clone)]
pub struct DownloadDescriptor {
    /// Package the descriptor was resolved for
    pub package_id: String,
    /// Requested version; None means the current one
    pub version_id: Option<String>,
    /// Artifact location
    pub url: String,
    /// Per-user entitlement blobs, in store order
    pub entitlement_blobs: Vec<Vec<u8>>,
    /// Store metadata written into `iTunesMetadata.plist`
    pub metadata: plist::Dictionary,
}

/// A repackaged archive ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackagedArtifact {
    /// Location of the archive
    pub path: PathBuf,
    /// `CFBundleIdentifier` of the app
    pub bundle_id: String,
    /// `CFBundleShortVersionString` of the app
    pub bundle_version: String,
    /// Archive size in bytes
    pub size: u64,
    /// Hex SHA-256 of the archive
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_hides_password() {
        let credential = Credential::new("user@example.com", "hunter2");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("user@example.com"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let mut session = SessionContext {
            apple_id: "a".into(),
            guid: "g".into(),
            headers: BTreeMap::new(),
            cookies: Vec::new(),
            account_name: "n".into(),
            created_at: Utc::now(),
        };
        assert_eq!(session.cookie_header(), None);

        session.cookies = vec![
            Cookie {
                name: "mz_at0".into(),
                value: "abc".into(),
                domain: Some(".apple.com".into()),
            },
            Cookie {
                name: "wosid".into(),
                value: "xyz".into(),
                domain: None,
            },
        ];
        assert_eq!(session.cookie_header().as_deref(), Some("mz_at0=abc; wosid=xyz"));
    }

    #[test]
    fn version_display_includes_label_when_distinct() {
        let labelled = VersionDescriptor {
            external_id: "861234".into(),
            display_version: "2.3.1".into(),
        };
        assert_eq!(labelled.to_string(), "2.3.1 (861234)");

        let bare = VersionDescriptor {
            external_id: "861234".into(),
            display_version: "861234".into(),
        };
        assert_eq!(bare.to_string(), "861234");
    }
}
