//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap derive, with
//! validation of the values clap cannot check on its own.

use super::output::ColorChoice;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Reinstall historical releases of iOS apps over the air
#[derive(Parser, Debug)]
#[command(
    name = "ipa_downgrader",
    version,
    about = "Reinstall historical releases of iOS apps over the air",
    long_about = "Signs in to the store, downloads a chosen historical release of an app, injects
the account's entitlements and serves the result on the local network so the
device can install it over the air.

Usage:
  ipa_downgrader login --apple-id user@example.com --password '...'
  ipa_downgrader versions https://apps.apple.com/us/app/example/id544007664
  ipa_downgrader downgrade 544007664 --version 861234
  ipa_downgrader logout

Exit code 0 = the command completed; 1 = an error was printed with hints."
)]
pub struct Args {
    /// TOML config file overriding the built-in defaults
    #[arg(long, global = true, value_name = "PATH", env = "IPA_DOWNGRADER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the encrypted identity and its key
    #[arg(long, global = true, value_name = "DIR", env = "IPA_DOWNGRADER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Scratch directory for downloaded and repackaged archives
    #[arg(long, global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Port the local distribution server binds to
    #[arg(long, global = true, value_name = "PORT")]
    pub port: Option<u16>,

    /// Print additional detail
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print results only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// When to color output
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session encrypted at rest
    Login(LoginArgs),

    /// Forget the stored session and rotate the identity key
    Logout,

    /// List the historical versions of an app
    Versions(VersionsArgs),

    /// Download, repackage and serve one version for installation
    Downgrade(DowngradeArgs),
}

/// Arguments for `login`
#[derive(ClapArgs, Debug)]
pub struct LoginArgs {
    /// Account e-mail
    #[arg(long, value_name = "EMAIL", env = "IPA_DOWNGRADER_APPLE_ID")]
    pub apple_id: String,

    /// Account password
    #[arg(long, env = "IPA_DOWNGRADER_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Two-factor code shown on a trusted device
    #[arg(long, value_name = "CODE")]
    pub code: Option<String>,
}

/// Where version listings come from
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VersionSource {
    /// The store's private protocol (requires login)
    #[default]
    Private,
    /// The public version history mirror
    Public,
}

/// Arguments for `versions`
#[derive(ClapArgs, Debug)]
pub struct VersionsArgs {
    /// Numeric app id or store share link
    #[arg(value_name = "APP")]
    pub app: String,

    /// Version source
    #[arg(long, value_enum, default_value_t = VersionSource::Private)]
    pub source: VersionSource,
}

/// Arguments for `downgrade`
#[derive(ClapArgs, Debug)]
pub struct DowngradeArgs {
    /// Numeric app id or store share link
    #[arg(value_name = "APP")]
    pub app: String,

    /// External version id, as printed by `versions`
    #[arg(long = "version", value_name = "ID")]
    pub version_id: String,

    /// Open the manifest URL directly (devices on older OS versions)
    #[arg(long)]
    pub legacy_os: bool,

    /// Stop serving after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the install URL instead of opening it
    #[arg(long)]
    pub no_open: bool,

    /// Keep the work directory after serving
    #[arg(long)]
    pub keep_work_dir: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Login(login) => {
                if login.apple_id.trim().is_empty() {
                    return Err("Apple ID cannot be empty".to_string());
                }
                if login.password.is_empty() {
                    return Err("Password cannot be empty".to_string());
                }
                if let Some(code) = &login.code {
                    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(format!("Two-factor code must be digits only, got '{code}'"));
                    }
                }
            }
            Command::Downgrade(downgrade) => {
                if downgrade.version_id.trim().is_empty() {
                    return Err("Version id cannot be empty".to_string());
                }
                if downgrade.timeout == Some(0) {
                    return Err("Timeout must be at least one second".to_string());
                }
            }
            Command::Logout | Command::Versions(_) => {}
        }
        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, args.quiet, args.color),
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print verbose message if in verbose mode
    pub fn verbose_println(&self, message: &str) -> std::io::Result<()> {
        self.output.verbose(message)
    }

    /// Print success message if not in quiet mode
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.output.success(message)
    }

    /// Print warning message
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.output.warn(message)
    }

    /// Print progress message
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.output.progress(message)
    }

    /// Print section header
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        self.output.section(title)
    }

    /// Print indented text
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.output.indent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn downgrade_flags_parse() {
        let args = Args::try_parse_from([
            "ipa_downgrader",
            "--port",
            "9191",
            "downgrade",
            "544007664",
            "--version",
            "861234",
            "--legacy-os",
            "--timeout",
            "600",
        ])
        .unwrap();
        assert_eq!(args.port, Some(9191));
        let Command::Downgrade(downgrade) = &args.command else {
            panic!("expected downgrade, got {:?}", args.command);
        };
        assert_eq!(downgrade.version_id, "861234");
        assert!(downgrade.legacy_os);
        assert_eq!(downgrade.timeout, Some(600));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn versions_source_defaults_to_private() {
        let args = Args::try_parse_from(["ipa_downgrader", "versions", "544007664"]).unwrap();
        let Command::Versions(versions) = &args.command else {
            panic!("expected versions");
        };
        assert_eq!(versions.source, VersionSource::Private);
    }

    #[test]
    fn non_numeric_code_is_rejected() {
        let args = Args::try_parse_from([
            "ipa_downgrader",
            "login",
            "--apple-id",
            "user@example.com",
            "--password",
            "hunter2",
            "--code",
            "12a456",
        ])
        .unwrap();
        assert!(args.validate().unwrap_err().contains("digits"));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["ipa_downgrader", "-v", "-q", "logout"]).is_err());
    }
}
