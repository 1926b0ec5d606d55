//! `logout` subcommand.

use super::auth_session;
use crate::cli::RuntimeConfig;
use crate::downgrader::Settings;
use crate::error::Result;

/// Deletes the stored identity and rotates the key.
///
/// Succeeds when nobody is signed in.
pub fn logout(settings: &Settings, config: &RuntimeConfig) -> Result<()> {
    let mut session = auth_session(settings);
    session.logout()?;
    config.success("Signed out")?;
    Ok(())
}
