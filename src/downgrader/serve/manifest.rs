//! Install-manifest URL generation.

/// Scheme prefix the device hands to its installer.
pub const ITMS_PREFIX: &str = "itms-services://?action=download-manifest&url=";

/// Path the artifact is served under.
pub const ARTIFACT_PATH: &str = "/signed.ipa";

/// Path of the install-trigger page.
pub const INSTALL_PAGE_PATH: &str = "/install";

/// Device-local URL of the served artifact.
pub fn artifact_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}{ARTIFACT_PATH}")
}

/// Builds the `itms-services` URL for an artifact served on `port`.
///
/// The manifest service turns the query into an OTA manifest pointing at
/// [`artifact_url`]. The whole service URL is percent-encoded into the
/// `url` parameter.
pub fn manifest_url(service: &str, bundle_id: &str, version: &str, port: u16) -> String {
    let service_url = format!(
        "{service}?bundleid={bundle_id}&name={bundle_id}&version={version}&fetchurl={}",
        artifact_url(port)
    );
    format!("{ITMS_PREFIX}{}", urlencoding::encode(&service_url))
}
