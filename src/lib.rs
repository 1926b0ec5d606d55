//! Store downgrade client library for reinstalling historical iOS app releases
//!
//! This library provides the pipeline for:
//! - signing in to the store and persisting the session encrypted at rest
//! - listing historical versions (private protocol or public mirror)
//! - downloading a release and injecting the account's entitlements
//! - serving the repackaged archive for an over-the-air install
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod cli;
pub mod downgrader;
pub mod error;
pub mod source;

// Re-export commonly used types
pub use error::{CliError, DowngraderError, Result};
pub use source::AppSource;
