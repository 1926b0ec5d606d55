//! Wire format of the private store protocol.
//!
//! Requests are XML property lists posted with a form content type, never
//! JSON; responses are property lists. Failures come back as HTTP 200 with a
//! `customerMessage` and, for purchases, a `cancel-purchase-batch` marker.

use crate::downgrader::settings::Settings;
use crate::downgrader::types::SessionContext;
use plist::{Dictionary, Value};
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use std::io::Cursor;

pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Numeric account id header.
pub const HEADER_DSID: &str = "X-Dsid";
/// Second copy of the account id the download endpoint also checks.
pub const HEADER_ICLOUD_DSID: &str = "iCloud-Dsid";
/// Store-front header.
pub const HEADER_STORE_FRONT: &str = "X-Apple-Store-Front";
/// Password token header.
pub const HEADER_TOKEN: &str = "X-Token";

/// Response header carrying the account's store front after sign-in.
pub(crate) const STORE_FRONT_RESPONSE_HEADER: &str = "x-set-apple-store-front";

#[derive(Debug)]
pub(crate) enum ProtocolError {
    Transport(String),
    InvalidResponse(String),
}

/// Serializes request fields as an XML property-list dictionary.
pub(crate) fn encode_body(fields: Dictionary) -> Result<Vec<u8>, ProtocolError> {
    let mut body = Vec::new();
    plist::to_writer_xml(&mut body, &Value::Dictionary(fields))
        .map_err(|e| ProtocolError::InvalidResponse(format!("could not encode request: {e}")))?;
    Ok(body)
}

/// Parses a response body into its top-level dictionary.
pub(crate) fn decode_body(bytes: &[u8]) -> Result<Dictionary, ProtocolError> {
    let value = Value::from_reader(Cursor::new(bytes))
        .map_err(|e| ProtocolError::InvalidResponse(format!("not a property list: {e}")))?;
    value
        .into_dictionary()
        .ok_or_else(|| ProtocolError::InvalidResponse("top level is not a dictionary".into()))
}

/// Human-readable failure text supplied by the store.
pub(crate) fn customer_message(response: &Dictionary) -> Option<String> {
    response
        .get("customerMessage")
        .and_then(Value::as_string)
        .map(str::to_string)
}

/// Whether the store aborted the purchase/download batch.
pub(crate) fn is_cancelled(response: &Dictionary) -> bool {
    response.contains_key("cancel-purchase-batch")
}

/// First entry of `songList`, the only one the store returns for a
/// single-product query.
pub(crate) fn first_song(response: &Dictionary) -> Option<&Dictionary> {
    response
        .get("songList")
        .and_then(Value::as_array)
        .and_then(|songs| songs.first())
        .and_then(Value::as_dictionary)
}

/// Renders an integer, string or real value as a string.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    if let Some(n) = value.as_signed_integer() {
        return Some(n.to_string());
    }
    if let Some(n) = value.as_unsigned_integer() {
        return Some(n.to_string());
    }
    if let Some(s) = value.as_string() {
        return Some(s.to_string());
    }
    value.as_real().map(|r| r.to_string())
}

/// Issues an authenticated `volumeStoreDownloadProduct` query.
///
/// Without `version_id` the store answers for the current release.
pub(crate) async fn download_product(
    client: &Client,
    settings: &Settings,
    session: &SessionContext,
    package_id: &str,
    version_id: Option<&str>,
) -> Result<Dictionary, ProtocolError> {
    let mut url = settings.download_url().clone();
    url.query_pairs_mut().append_pair("guid", &session.guid);

    let mut fields = Dictionary::new();
    fields.insert("creditDisplay".into(), Value::String(String::new()));
    fields.insert("guid".into(), Value::String(session.guid.clone()));
    fields.insert("salableAdamId".into(), Value::String(package_id.to_string()));
    if let Some(version_id) = version_id {
        fields.insert("externalVersionId".into(), Value::String(version_id.to_string()));
    }

    let mut request = client
        .post(url)
        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
        .body(encode_body(fields)?);
    for (name, value) in &session.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(cookies) = session.cookie_header() {
        request = request.header(COOKIE, cookies);
    }

    log::debug!(
        "Querying download info for app {} (version {})",
        package_id,
        version_id.unwrap_or("current")
    );

    let response = request
        .send()
        .await
        .map_err(|e| ProtocolError::Transport(e.to_string()))?;
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProtocolError::Transport(e.to_string()))?;

    match decode_body(&bytes) {
        Ok(dict) => Ok(dict),
        Err(_) if !status.is_success() => Err(ProtocolError::Transport(format!(
            "store returned HTTP {status}"
        ))),
        Err(e) => Err(e),
    }
}
