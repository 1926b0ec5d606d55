//! Command line interface for the downgrader.
//!
//! This module provides the CLI for sign-in, version listing and
//! downgrade operations, with argument parsing, settings resolution and
//! user feedback.

mod args;
pub mod commands;
mod output;

pub use args::{
    Args, Command, DowngradeArgs, LoginArgs, RuntimeConfig, VersionSource, VersionsArgs,
};
pub use output::{ColorChoice, OutputManager};

use crate::downgrader::{ConfigFile, InstallMode, Settings, SettingsBuilder};
use crate::error::{CliError, Result};
use std::time::Duration;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    validate_args(&args).map_err(|reason| CliError::InvalidArguments { reason })?;

    let config = create_runtime_config(&args);
    let settings = build_settings(&args)?;
    log::debug!(
        "State directory {}, work directory {}",
        settings.state_dir().display(),
        settings.work_dir().display()
    );

    match &args.command {
        Command::Login(login) => commands::login(&settings, login, &config).await?,
        Command::Logout => commands::logout(&settings, &config)?,
        Command::Versions(versions) => commands::versions(&settings, versions, &config).await?,
        Command::Downgrade(downgrade) => {
            commands::downgrade(&settings, downgrade, &config).await?
        }
    }
    Ok(0)
}

/// Parse arguments without executing (for testing)
pub fn parse_args() -> Args {
    Args::parse_args()
}

/// Validate arguments without executing (for testing)
pub fn validate_args(args: &Args) -> std::result::Result<(), String> {
    args.validate()
}

/// Create runtime configuration from arguments
pub fn create_runtime_config(args: &Args) -> RuntimeConfig {
    RuntimeConfig::from(args)
}

/// Resolves settings from defaults, the config file and flags, in that
/// order of increasing precedence.
pub fn build_settings(args: &Args) -> Result<Settings> {
    let file = match &args.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    let mut builder = SettingsBuilder::new().config_file(file);
    if let Some(dir) = &args.state_dir {
        builder = builder.state_dir(dir);
    }
    if let Some(dir) = &args.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    if let Command::Downgrade(downgrade) = &args.command {
        if downgrade.legacy_os {
            builder = builder.install_mode(InstallMode::DirectManifest);
        }
        if let Some(secs) = downgrade.timeout {
            builder = builder.serve_timeout(Duration::from_secs(secs));
        }
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "port = 9191\nserve_timeout_secs = 30\n").unwrap();

        let args = Args::try_parse_from([
            "ipa_downgrader",
            "--config",
            config.to_str().unwrap(),
            "--state-dir",
            dir.path().to_str().unwrap(),
            "downgrade",
            "1",
            "--version",
            "2",
            "--port",
            "9292",
            "--legacy-os",
        ])
        .unwrap();
        let settings = build_settings(&args).unwrap();
        assert_eq!(settings.port(), 9292);
        assert_eq!(settings.serve_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(settings.install_mode(), InstallMode::DirectManifest);
        assert_eq!(settings.state_dir(), dir.path());
    }

    #[test]
    fn unreadable_config_is_an_error() {
        let args = Args::try_parse_from([
            "ipa_downgrader",
            "--config",
            "/nonexistent/ipa_downgrader.toml",
            "logout",
        ])
        .unwrap();
        assert!(build_settings(&args).is_err());
    }
}
