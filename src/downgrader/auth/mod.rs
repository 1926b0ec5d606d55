//! Store sign-in and session lifecycle.
//!
//! [`AuthSession`] owns the credential and the request context produced by
//! a successful sign-in. It moves through
//! `Unauthenticated → Authenticating → Authenticated` and back to
//! `Unauthenticated` on logout or on a terminal sign-in failure.
//!
//! A decryptable identity in the [`CredentialVault`] short-circuits the
//! network flow entirely.

mod guid;

pub use guid::derive_guid;

use crate::downgrader::error::{AuthError, SecretStoreError};
use crate::downgrader::protocol::{
    self, FORM_CONTENT_TYPE, HEADER_DSID, HEADER_ICLOUD_DSID, HEADER_STORE_FRONT, HEADER_TOKEN,
    STORE_FRONT_RESPONSE_HEADER,
};
use crate::downgrader::secret::{CredentialVault, PersistedIdentity};
use crate::downgrader::settings::Settings;
use crate::downgrader::types::{Cookie, Credential, SessionContext};
use crate::downgrader::utils::http::store_client;
use plist::{Dictionary, Value};
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Response, Url};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sign-in attempts issued before giving up.
pub const MAX_ATTEMPTS: u32 = 4;

/// Redirects followed across one sign-in. Following a redirect does not
/// use up an attempt.
pub const MAX_REDIRECTS: u32 = 3;

/// `customerMessage` the store sends when the account needs a one-time code.
const TWO_FACTOR_MESSAGE: &str = "MZFinance.BadLogin.Configurator_message";

/// Authentication state.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// No session
    Unauthenticated,
    /// A sign-in is in flight
    Authenticating,
    /// Signed in with the contained request context
    Authenticated(SessionContext),
}

/// Owns the credential and session of the single active account.
#[derive(Debug)]
pub struct AuthSession {
    settings: Settings,
    vault: CredentialVault,
    state: AuthState,
    credential: Option<Credential>,
}

/// What one sign-in attempt produced, other than success.
enum AttemptOutcome {
    Redirected(Url),
    Rejected {
        message: Option<String>,
        needs_code: bool,
    },
    Undecodable(String),
    Unreachable(String),
}

impl AuthSession {
    /// Creates an unauthenticated session backed by `vault`.
    pub fn new(settings: Settings, vault: CredentialVault) -> Self {
        Self {
            settings,
            vault,
            state: AuthState::Unauthenticated,
            credential: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Request context, when authenticated.
    pub fn session(&self) -> Option<&SessionContext> {
        match &self.state {
            AuthState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// Credential of the signed-in (or last attempted) account.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Loads the persisted identity without contacting the store.
    ///
    /// An identity that can no longer be decrypted (key wiped or rotated,
    /// blob tampered with) is deleted and reported as absent.
    pub fn restore(&mut self) -> Result<Option<SessionContext>, AuthError> {
        let identity = match self.vault.load() {
            Ok(Some(identity)) => identity,
            Ok(None) => return Ok(None),
            Err(
                e @ (SecretStoreError::Crypto(_)
                | SecretStoreError::Corrupt(_)
                | SecretStoreError::KeyMissing),
            ) => {
                log::warn!("Discarding unreadable stored identity: {e}");
                self.vault.clear()?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        log::info!("Restored session for {}", identity.credential.apple_id);
        let session = identity.session;
        self.credential = Some(identity.credential);
        self.state = AuthState::Authenticated(session.clone());
        Ok(Some(session))
    }

    /// Signs in, reusing a stored identity for the same account when one
    /// exists.
    ///
    /// `two_factor_code` is appended to the password. Without it, an
    /// account that needs one fails fast with
    /// [`AuthError::TwoFactorRequired`]; with it, exactly one attempt is
    /// made.
    pub async fn authenticate(
        &mut self,
        mut credential: Credential,
        two_factor_code: Option<&str>,
    ) -> Result<SessionContext, AuthError> {
        if let Some(session) = self.restore()? {
            if session.apple_id == credential.apple_id {
                return Ok(session);
            }
            log::info!(
                "Stored identity belongs to {}, signing in as {}",
                session.apple_id,
                credential.apple_id
            );
            self.state = AuthState::Unauthenticated;
        }

        let guid = credential
            .guid
            .get_or_insert_with(|| derive_guid(&credential.apple_id))
            .clone();
        log::debug!("Using GUID {guid} for {}", credential.apple_id);

        self.state = AuthState::Authenticating;
        self.credential = Some(credential.clone());

        match self.sign_in(&credential, &guid, two_factor_code).await {
            Ok(session) => {
                let identity = PersistedIdentity {
                    credential,
                    session: session.clone(),
                };
                if let Err(e) = self.vault.persist(&identity) {
                    log::warn!("Signed in but could not save the identity: {e}");
                }
                self.state = AuthState::Authenticated(session.clone());
                Ok(session)
            }
            Err(e) => {
                self.state = AuthState::Unauthenticated;
                Err(e)
            }
        }
    }

    /// Forgets the session, deletes the stored identity and rotates the key.
    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.vault.reset()?;
        self.state = AuthState::Unauthenticated;
        self.credential = None;
        log::info!("Signed out and rotated the identity key");
        Ok(())
    }

    async fn sign_in(
        &self,
        credential: &Credential,
        guid: &str,
        two_factor_code: Option<&str>,
    ) -> Result<SessionContext, AuthError> {
        let jar = Arc::new(Jar::default());
        let client = store_client(&self.settings, Some(jar))
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let password = match two_factor_code {
            Some(code) => format!("{}{}", credential.password, code.trim()),
            None => credential.password.clone(),
        };
        let max_attempts = if two_factor_code.is_some() { 1 } else { MAX_ATTEMPTS };

        let mut url = self.settings.auth_url().clone();
        let mut cookies: Vec<Cookie> = Vec::new();
        let mut rejected = false;
        let mut last_message: Option<String> = None;
        let mut last_invalid: Option<String> = None;
        let mut last_transport: Option<String> = None;

        let mut attempt = 1;
        let mut redirects = 0;
        while attempt <= max_attempts {
            log::info!("Sign-in attempt {attempt}/{max_attempts}");
            let body = sign_in_body(credential, &password, guid, attempt)
                .map_err(|e| AuthError::InvalidResponse(format!("{e:?}")))?;

            let response = match client
                .post(url.clone())
                .header(ACCEPT, "*/*")
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("Sign-in attempt {attempt} failed to reach the store: {e}");
                    last_transport = Some(e.to_string());
                    attempt += 1;
                    continue;
                }
            };

            merge_cookies(&mut cookies, &response);

            let outcome = match self
                .read_attempt(response, &url, credential, guid, &cookies)
                .await?
            {
                Ok(session) => {
                    log::info!("Signed in as {}", session.account_name);
                    return Ok(session);
                }
                Err(outcome) => outcome,
            };

            match outcome {
                AttemptOutcome::Redirected(next) => {
                    redirects += 1;
                    if redirects > MAX_REDIRECTS {
                        log::warn!("Store redirected sign-in more than {MAX_REDIRECTS} times");
                        last_invalid = Some(format!("more than {MAX_REDIRECTS} redirects"));
                        break;
                    }
                    log::debug!("Store redirected sign-in to {next}");
                    url = next;
                    continue;
                }
                AttemptOutcome::Rejected {
                    message,
                    needs_code,
                } => {
                    if needs_code && two_factor_code.is_none() {
                        return Err(AuthError::TwoFactorRequired);
                    }
                    log::warn!(
                        "Sign-in attempt {attempt} rejected: {}",
                        message.as_deref().unwrap_or("no message")
                    );
                    rejected = true;
                    if message.is_some() {
                        last_message = message;
                    }
                }
                AttemptOutcome::Undecodable(detail) => {
                    log::warn!("Sign-in attempt {attempt} returned an unreadable body: {detail}");
                    last_invalid = Some(detail);
                }
                AttemptOutcome::Unreachable(detail) => {
                    log::warn!("Sign-in attempt {attempt} failed mid-response: {detail}");
                    last_transport = Some(detail);
                }
            }
            attempt += 1;
        }

        if rejected {
            return Err(AuthError::InvalidCredentials {
                attempts: max_attempts,
                message: last_message,
            });
        }
        if let Some(detail) = last_invalid {
            return Err(AuthError::InvalidResponse(detail));
        }
        Err(AuthError::Transport(
            last_transport.unwrap_or_else(|| "no response from the store".to_string()),
        ))
    }

    /// Classifies one response. The outer error is terminal; the inner
    /// `Err` lets the attempt loop continue.
    async fn read_attempt(
        &self,
        response: Response,
        url: &Url,
        credential: &Credential,
        guid: &str,
        cookies: &[Cookie],
    ) -> Result<Result<SessionContext, AttemptOutcome>, AuthError> {
        if response.status().is_redirection() {
            return Ok(Err(match redirect_target(url, &response) {
                Some(next) => AttemptOutcome::Redirected(next),
                None => AttemptOutcome::Undecodable(format!(
                    "redirect ({}) without a usable Location",
                    response.status()
                )),
            }));
        }

        let store_front = response
            .headers()
            .get(STORE_FRONT_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Err(AttemptOutcome::Unreachable(e.to_string()))),
        };
        let body = match protocol::decode_body(&bytes) {
            Ok(body) => body,
            Err(e) => return Ok(Err(AttemptOutcome::Undecodable(format!("{e:?}")))),
        };

        if body.get("m-allowed").and_then(Value::as_boolean) != Some(true) {
            return Ok(Err(AttemptOutcome::Rejected {
                message: protocol::customer_message(&body),
                needs_code: is_two_factor_failure(&body),
            }));
        }

        let session = build_session(&body, store_front, credential, guid, cookies)?;
        Ok(Ok(session))
    }
}

fn sign_in_body(
    credential: &Credential,
    password: &str,
    guid: &str,
    attempt: u32,
) -> Result<Vec<u8>, protocol::ProtocolError> {
    let mut fields = Dictionary::new();
    fields.insert("appleId".into(), Value::String(credential.apple_id.clone()));
    fields.insert("password".into(), Value::String(password.to_string()));
    fields.insert("guid".into(), Value::String(guid.to_string()));
    fields.insert("attempt".into(), Value::String(attempt.to_string()));
    fields.insert("rmp".into(), Value::String("0".into()));
    fields.insert("why".into(), Value::String("signIn".into()));
    protocol::encode_body(fields)
}

fn redirect_target(current: &Url, response: &Response) -> Option<Url> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}

fn is_two_factor_failure(body: &Dictionary) -> bool {
    let failure_type = body
        .get("failureType")
        .and_then(Value::as_string)
        .unwrap_or_default();
    failure_type.is_empty()
        && protocol::customer_message(body).as_deref() == Some(TWO_FACTOR_MESSAGE)
}

/// Later cookies with the same name replace earlier ones.
fn merge_cookies(cookies: &mut Vec<Cookie>, response: &Response) {
    for cookie in response.cookies() {
        let captured = Cookie {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            domain: cookie.domain().map(str::to_string),
        };
        match cookies.iter_mut().find(|c| c.name == captured.name) {
            Some(existing) => *existing = captured,
            None => cookies.push(captured),
        }
    }
}

fn build_session(
    body: &Dictionary,
    store_front: Option<String>,
    credential: &Credential,
    guid: &str,
    cookies: &[Cookie],
) -> Result<SessionContext, AuthError> {
    let dsid = body
        .get("download-queue-info")
        .and_then(Value::as_dictionary)
        .and_then(|info| info.get("dsid"))
        .and_then(protocol::scalar_to_string)
        .ok_or_else(|| AuthError::InvalidResponse("missing download-queue-info.dsid".into()))?;
    let token = body
        .get("passwordToken")
        .and_then(Value::as_string)
        .ok_or_else(|| AuthError::InvalidResponse("missing passwordToken".into()))?;
    let store_front = store_front.ok_or_else(|| {
        AuthError::InvalidResponse(format!("missing {STORE_FRONT_RESPONSE_HEADER} header"))
    })?;

    let headers = BTreeMap::from([
        (HEADER_DSID.to_string(), dsid.clone()),
        (HEADER_ICLOUD_DSID.to_string(), dsid),
        (HEADER_STORE_FRONT.to_string(), store_front),
        (HEADER_TOKEN.to_string(), token.to_string()),
    ]);

    Ok(SessionContext {
        apple_id: credential.apple_id.clone(),
        guid: guid.to_string(),
        headers,
        cookies: cookies.to_vec(),
        account_name: account_name(body).unwrap_or_else(|| credential.apple_id.clone()),
        created_at: chrono::Utc::now(),
    })
}

fn account_name(body: &Dictionary) -> Option<String> {
    let address = body
        .get("accountInfo")
        .and_then(Value::as_dictionary)?
        .get("address")
        .and_then(Value::as_dictionary)?;
    let first = address.get("firstName").and_then(Value::as_string)?;
    let last = address.get("lastName").and_then(Value::as_string)?;
    Some(format!("{first} {last}"))
}
