//! `login` subcommand.

use super::auth_session;
use crate::cli::{LoginArgs, RuntimeConfig};
use crate::downgrader::{Credential, Settings};
use crate::error::Result;

/// Signs in and persists the session.
pub async fn login(settings: &Settings, args: &LoginArgs, config: &RuntimeConfig) -> Result<()> {
    let mut session = auth_session(settings);
    config.progress(&format!("Signing in as {}", args.apple_id))?;

    let credential = Credential::new(args.apple_id.trim(), args.password.clone());
    let context = session
        .authenticate(credential, args.code.as_deref())
        .await?;

    config.success(&format!(
        "Signed in as {} ({})",
        context.account_name, context.apple_id
    ))?;
    config.verbose_println(&format!(
        "Identity stored in {}",
        settings.state_dir().display()
    ))?;
    Ok(())
}
