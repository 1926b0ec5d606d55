//! IPA Downgrader - reinstall historical iOS app releases over the air.
//!
//! This binary signs in to the store, downloads a chosen release, injects the
//! account's entitlements and serves the result to the device on the local
//! network, with proper error handling and recovery hints.

use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match ipa_downgrader::cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {}", suggestion);
            }
            1
        }
    };

    process::exit(exit_code);
}
