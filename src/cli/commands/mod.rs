//! Command execution functions for downgrader operations.
//!
//! Each subcommand builds the components it needs from [`Settings`]; the
//! stored identity lives in the state directory behind a
//! [`FileSecretStore`].

mod downgrade;
mod login;
mod logout;
mod versions;

pub use downgrade::downgrade;
pub use login::login;
pub use logout::logout;
pub use versions::versions;

use crate::downgrader::{AuthSession, CredentialVault, FileSecretStore, Settings};
use std::sync::Arc;

/// Auth session backed by the file secret store in the state directory.
pub fn auth_session(settings: &Settings) -> AuthSession {
    let store = FileSecretStore::new(settings.state_dir());
    let vault = CredentialVault::new(Arc::new(store), settings.state_dir());
    AuthSession::new(settings.clone(), vault)
}
