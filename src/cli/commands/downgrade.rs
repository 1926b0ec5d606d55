//! `downgrade` subcommand.

use super::auth_session;
use crate::cli::{DowngradeArgs, RuntimeConfig};
use crate::downgrader::{
    CommandTrigger, Downgrader, Error, InstallTrigger, ManualTrigger, SessionContext, Settings,
};
use crate::error::Result;
use crate::source::AppSource;
use std::future::Future;
use std::io;

/// Fetches, repackages and serves one version until the install is done.
///
/// Serving ends on Ctrl-C or when the configured serve timeout elapses.
pub async fn downgrade(
    settings: &Settings,
    args: &DowngradeArgs,
    config: &RuntimeConfig,
) -> Result<()> {
    let app = AppSource::parse(&args.app)?;
    let session = auth_session(settings)
        .restore()?
        .ok_or(Error::NotAuthenticated)?;

    let downgrader = Downgrader::new(settings.clone())?;
    config.progress(&format!(
        "Downloading version {} of {app}",
        args.version_id
    ))?;
    let result = serve(&downgrader, &session, &app, args, config).await;

    if args.keep_work_dir {
        config.verbose_println(&format!(
            "Keeping work directory {}",
            settings.work_dir().display()
        ))?;
    } else if let Err(e) = downgrader.cleanup().await {
        log::warn!("Could not remove work directory: {e}");
    }
    result
}

async fn serve(
    downgrader: &Downgrader,
    session: &SessionContext,
    app: &AppSource,
    args: &DowngradeArgs,
    config: &RuntimeConfig,
) -> Result<()> {
    let artifact = downgrader
        .prepare(session, app.package_id(), &args.version_id)
        .await?;
    config.success(&format!(
        "Repackaged {} {} ({} bytes)",
        artifact.bundle_id, artifact.bundle_version, artifact.size
    ))?;
    config.verbose_println(&format!("sha256 {}", artifact.checksum))?;

    let trigger: Box<dyn InstallTrigger> = if args.no_open {
        Box::new(ManualTrigger)
    } else {
        match CommandTrigger::detect() {
            Some(trigger) => Box::new(trigger),
            None => {
                config.warn("No URL opener found; open the install URL on the device")?;
                Box::new(ManualTrigger)
            }
        }
    };

    let handle = downgrader.install(&artifact, trigger.as_ref()).await?;
    config.section("Serving install")?;
    config.indent(&format!("install page: {}", handle.install_page_url()))?;
    config.indent(&format!("manifest:     {}", handle.manifest_url()))?;
    config.indent(&format!("artifact:     {}", handle.artifact_url()))?;
    config.progress("Press Ctrl-C once the install has finished")?;

    let stop = handle.stop_handle();
    let interrupt = tokio::spawn(stop_on_interrupt(tokio::signal::ctrl_c(), move || {
        stop.stop()
    }));
    let served = handle.wait().await;
    interrupt.abort();
    served?;

    config.success("Distribution server stopped")?;
    Ok(())
}

/// Calls `stop` once `signal` reports an interrupt.
///
/// If the signal handler cannot be installed the server keeps running until
/// its own timeout, so this never resolves.
async fn stop_on_interrupt<S, F>(signal: S, stop: F)
where
    S: Future<Output = io::Result<()>>,
    F: FnOnce(),
{
    match signal.await {
        Ok(()) => {
            log::info!("Interrupted, stopping the distribution server");
            stop();
        }
        Err(e) => {
            log::warn!("Cannot listen for Ctrl-C ({e}); serving until the timeout");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn flag() -> (Arc<AtomicBool>, impl FnOnce()) {
        let stopped = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&stopped);
        (stopped, move || setter.store(true, Ordering::SeqCst))
    }

    #[tokio::test]
    async fn interrupt_stops_server() {
        let (stopped, stop) = flag();
        stop_on_interrupt(async { Ok(()) }, stop).await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_signal_handler_keeps_serving() {
        let (stopped, stop) = flag();
        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            stop_on_interrupt(async { Err(io::Error::other("no signal handler")) }, stop),
        )
        .await;
        assert!(waited.is_err(), "should still be waiting");
        assert!(!stopped.load(Ordering::SeqCst));
    }
}
