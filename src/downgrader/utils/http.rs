//! HTTP client construction.
//!
//! Store requests disable automatic redirects: the sign-in flow must see
//! the redirect target itself so the next attempt can be sent there with
//! its body intact.

use crate::downgrader::settings::Settings;
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use std::sync::Arc;

/// Client for the private store protocol.
///
/// When `jar` is given, cookies set by one response are sent with the
/// following requests.
pub fn store_client(settings: &Settings, jar: Option<Arc<Jar>>) -> reqwest::Result<Client> {
    let mut builder = Client::builder()
        .user_agent(settings.user_agent())
        .timeout(settings.request_timeout())
        .redirect(Policy::none());
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    builder.build()
}

/// Client for the public mirror and artifact downloads.
///
/// No overall timeout is applied: artifacts can be several gigabytes.
pub fn download_client(settings: &Settings) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(settings.user_agent())
        .connect_timeout(settings.request_timeout())
        .build()
}
