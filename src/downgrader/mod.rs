//! Store client, repackager and local distribution server.
//!
//! Components, leaf first:
//! - [`secret`]: the key store contract and the encrypted identity vault
//! - [`auth`]: sign-in state machine producing a [`SessionContext`]
//! - [`catalog`]: historical version listing (store or public mirror)
//! - [`fetch`]: download resolution and transfer
//! - [`repackage`]: entitlement injection and re-archiving
//! - [`serve`]: loopback server and install manifest URL
//! - [`Downgrader`]: the pipeline tying the last three together

pub mod auth;
pub mod catalog;
pub mod error;
pub mod fetch;
mod orchestrator;
mod protocol;
pub mod repackage;
pub mod secret;
pub mod serve;
pub mod settings;
pub mod types;
pub mod utils;

pub use auth::{AuthSession, AuthState, derive_guid};
pub use catalog::CatalogClient;
pub use error::{
    AuthError, CatalogError, Error, ErrorExt, FetchError, RepackageError, RepackageStep, Result,
    SecretStoreError, ServerError,
};
pub use fetch::PackageFetcher;
pub use orchestrator::Downgrader;
pub use protocol::{HEADER_DSID, HEADER_ICLOUD_DSID, HEADER_STORE_FRONT, HEADER_TOKEN};
pub use repackage::PackageRepackager;
pub use secret::{
    CredentialVault, FileSecretStore, MemorySecretStore, PersistedIdentity, SecretStore,
};
pub use serve::{
    CommandTrigger, DistributionServer, InstallTrigger, ManualTrigger, ServerHandle, StopHandle,
};
pub use settings::{ConfigFile, InstallMode, RetryConfig, Settings, SettingsBuilder, SettingsError};
pub use types::{
    Cookie, Credential, DownloadDescriptor, RepackagedArtifact, SessionContext, VersionDescriptor,
};
