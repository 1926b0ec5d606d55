//! `versions` subcommand.

use super::auth_session;
use crate::cli::{RuntimeConfig, VersionSource, VersionsArgs};
use crate::downgrader::{CatalogClient, Error, Settings};
use crate::error::Result;
use crate::source::AppSource;

/// Lists the historical versions of an app.
pub async fn versions(
    settings: &Settings,
    args: &VersionsArgs,
    config: &RuntimeConfig,
) -> Result<()> {
    let app = AppSource::parse(&args.app)?;
    let catalog = CatalogClient::new(settings)?;

    let versions = match args.source {
        VersionSource::Private => {
            let session = auth_session(settings)
                .restore()?
                .ok_or(Error::NotAuthenticated)?;
            config.progress(&format!("Listing versions of {app} from the store"))?;
            catalog
                .list_versions_private(&session, app.package_id())
                .await?
        }
        VersionSource::Public => {
            config.progress(&format!("Listing versions of {app} from the public mirror"))?;
            catalog.list_versions_public(app.package_id()).await?
        }
    };

    config.section(&format!("{} versions of {}", versions.len(), app.package_id()))?;
    for version in &versions {
        config.indent(&version.to_string())?;
    }
    Ok(())
}
