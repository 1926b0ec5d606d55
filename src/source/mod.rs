//! App source resolution

use crate::error::{CliError, DowngraderError, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// Digits following the last `id` in a share link path.
static PACKAGE_ID: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"id(\d+)").ok());

/// The app a command operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppSource {
    /// A bare numeric package id
    PackageId(String),
    /// A store share link and the package id extracted from it
    ShareLink { url: Url, package_id: String },
}

impl AppSource {
    /// Parses a bare numeric id or a store share link such as
    /// `https://apps.apple.com/us/app/example/id544007664`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(Self::PackageId(input.to_string()));
        }

        let url = Url::parse(input).map_err(|e| {
            invalid(format!(
                "'{input}' is neither a numeric app id nor a share link: {e}"
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported link scheme '{}'", url.scheme())));
        }

        let package_id = PACKAGE_ID
            .as_ref()
            .and_then(|re| re.captures_iter(url.path()).last())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| invalid(format!("no app id found in link '{input}'")))?;

        Ok(Self::ShareLink { url, package_id })
    }

    /// Store package id of the app.
    pub fn package_id(&self) -> &str {
        match self {
            Self::PackageId(id) => id,
            Self::ShareLink { package_id, .. } => package_id,
        }
    }
}

impl fmt::Display for AppSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackageId(id) => write!(f, "{id}"),
            Self::ShareLink { url, package_id } => write!(f, "{package_id} ({url})"),
        }
    }
}

fn invalid(reason: String) -> DowngraderError {
    DowngraderError::Cli(CliError::InvalidArguments { reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_id_is_used_as_is() {
        let source = AppSource::parse("544007664").unwrap();
        assert_eq!(source, AppSource::PackageId("544007664".into()));
        assert_eq!(source.package_id(), "544007664");
    }

    #[test]
    fn share_link_yields_trailing_id() {
        let source =
            AppSource::parse("https://apps.apple.com/us/app/youtube-watch-listen-stream/id544007664")
                .unwrap();
        assert_eq!(source.package_id(), "544007664");
        assert!(matches!(source, AppSource::ShareLink { .. }));
    }

    #[test]
    fn query_string_is_ignored() {
        let source = AppSource::parse("https://apps.apple.com/app/id1234?mt=8&id=99").unwrap();
        assert_eq!(source.package_id(), "1234");
    }

    #[test]
    fn last_id_in_path_wins() {
        let source = AppSource::parse("https://apps.apple.com/app/idiom-app/id42").unwrap();
        assert_eq!(source.package_id(), "42");
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "youtube", "https://apps.apple.com/us/app/youtube", "ftp://x/id1"] {
            let err = AppSource::parse(input).unwrap_err();
            assert!(
                matches!(err, DowngraderError::Cli(CliError::InvalidArguments { .. })),
                "{input}"
            );
        }
    }
}
