use crate::cancellation::CancellationToken;
use crate::config::{LauncherConfig, MirrorConfig};
use crate::download::{
    AssetDownloader, DownloadUrlPolicy, FetchOptions, IndicatifProgress, RewritePolicy,
    SilentProgress,
};
use crate::error::{MirrorError, Result};
use crate::github::{ReleaseClient, parse_owner_repo};
use crate::index::VersionIndex;
use crate::manifest::Manifest;
use log::{error, info, warn};
use std::thread;
use std::time::Duration;

/// One mirroring pass (or a watch loop) over every configured launcher:
/// ask upstream for the newest release, download anything new, ingest the
/// manifest into the index.
pub struct SyncCommand<'a> {
    config: &'a MirrorConfig,
}

impl<'a> SyncCommand<'a> {
    pub fn new(config: &'a MirrorConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, watch: bool, no_progress: bool, token: &CancellationToken) -> Result<()> {
        let index = VersionIndex::new(self.config.storage_path.clone());
        index.init_from_disk()?;

        let downloader = AssetDownloader::new(self.fetch_options())?.with_progress(
            if no_progress {
                Box::new(SilentProgress)
            } else {
                Box::new(IndicatifProgress::new())
            },
        );
        let client = ReleaseClient::new(self.config.github_token.as_deref());

        loop {
            self.sync_all(&index, &client, &downloader, token)?;
            if !watch {
                return Ok(());
            }
            let interval = Duration::from_secs(self.config.check_interval_minutes.max(1) * 60);
            info!("Next check in {} minute(s)", interval.as_secs() / 60);
            if !sleep_observing_cancellation(interval, token) {
                return Err(MirrorError::Cancelled);
            }
        }
    }

    fn fetch_options(&self) -> FetchOptions {
        let mut substitutions = Vec::new();
        if let Some(mirror) = &self.config.mirror_domain {
            substitutions.push((
                "https://github.com/".to_string(),
                format!("{}/gh/", mirror.trim_end_matches('/')),
            ));
        }
        FetchOptions {
            timeout: Duration::from_secs(self.config.download_timeout_minutes.max(1) * 60),
            concurrency: self.config.concurrent_downloads,
            proxy: self.config.proxy_url.clone(),
            rewrite: RewritePolicy {
                prefix: self.config.asset_proxy_url.clone(),
                substitutions,
            },
            url_policy: DownloadUrlPolicy {
                base_url: self.config.download_url_base.clone(),
                server_address: self.config.server_address.clone(),
                server_port: self.config.server_port,
            },
            ..FetchOptions::default()
        }
    }

    /// Every launcher is attempted even when an earlier one fails; the
    /// first error is surfaced at the end.
    fn sync_all(
        &self,
        index: &VersionIndex,
        client: &ReleaseClient,
        downloader: &AssetDownloader,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut first_error = None;
        for launcher in &self.config.launchers {
            if token.is_cancelled() {
                return Err(MirrorError::Cancelled);
            }
            if let Err(e) = self.sync_launcher(launcher, index, client, downloader, token) {
                error!("Sync of {} failed: {e}", launcher.name);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn sync_launcher(
        &self,
        launcher: &LauncherConfig,
        index: &VersionIndex,
        client: &ReleaseClient,
        downloader: &AssetDownloader,
        token: &CancellationToken,
    ) -> Result<()> {
        let (owner, repo) = parse_owner_repo(&launcher.repo)?;
        let (release, rate) = client.latest_release(&owner, &repo)?;
        if let Some(backoff) = rate.backoff() {
            warn!(
                "Upstream quota exhausted, backing off for {}s",
                backoff.as_secs()
            );
            if !sleep_observing_cancellation(backoff, token) {
                return Err(MirrorError::Cancelled);
            }
        }

        let version = release.version_label();
        let manifest_path =
            Manifest::manifest_path(&self.config.storage_path.join(&launcher.name).join(&version));
        if index.contains(&launcher.name, &version) && manifest_path.exists() {
            info!("{} {version} is already mirrored", launcher.name);
            return Ok(());
        }

        info!(
            "Mirroring {} {version} ({} asset(s))",
            launcher.name,
            release.assets.len()
        );
        let manifest_path = downloader.fetch(
            &launcher.name,
            &release,
            &self.config.storage_path,
            true,
            token,
        )?;
        // The new manifest is not indexed yet, so this only unflags the
        // versions it supersedes. Clearing before the fetch would lose the
        // previous latest pointer if the fetch failed.
        index.clear_latest_flags(&launcher.name)?;
        index.update(&launcher.name, &version, &manifest_path);
        info!(
            "{} latest is now {:?}",
            launcher.name,
            index.latest_version(&launcher.name)
        );
        Ok(())
    }
}

fn sleep_observing_cancellation(duration: Duration, token: &CancellationToken) -> bool {
    let mut remaining = duration;
    let slice = Duration::from_millis(500);
    while !remaining.is_zero() {
        if token.is_cancelled() {
            return false;
        }
        let step = remaining.min(slice);
        thread::sleep(step);
        remaining -= step;
    }
    !token.is_cancelled()
}
