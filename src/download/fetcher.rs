use crate::cancellation::CancellationToken;
use crate::download::client::{AttohttpcClient, HttpClient};
use crate::download::options::{DEFAULT_CONCURRENT_DOWNLOADS, FetchOptions};
use crate::download::progress::{LogProgress, ProgressFactory, ProgressReporter};
use crate::download::semaphore::Semaphore;
use crate::error::{MirrorError, Result};
use crate::github::models::{Release, ReleaseAsset};
use crate::manifest::{Manifest, ManifestAsset};
use crate::storage;
use chrono::Utc;
use log::{debug, info, warn};
use std::fs;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;

const DOWNLOAD_CHUNK_SIZE: usize = 8192;
const PUBLIC_IP_ECHO_URL: &str = "http://ifconfig.me/ip";
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Materializes every asset of a release into `<base>/<launcher>/<version>/`
/// and writes the manifest once all of them are in place.
///
/// One downloader owns one transfer pool; every asset of every release
/// fetched through it competes for the same permits, so the number of
/// simultaneous outbound transfers stays bounded no matter how many releases
/// a scheduling cycle picks up.
pub struct AssetDownloader {
    client: Box<dyn HttpClient>,
    options: FetchOptions,
    slots: Semaphore,
    progress: Box<dyn ProgressFactory>,
    transfers: AtomicU64,
}

impl AssetDownloader {
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = AttohttpcClient::new(options.timeout, options.proxy.as_deref())?;
        Ok(Self::with_client(Box::new(client), options))
    }

    pub fn with_client(client: Box<dyn HttpClient>, options: FetchOptions) -> Self {
        let capacity = if options.concurrency == 0 {
            DEFAULT_CONCURRENT_DOWNLOADS
        } else {
            options.concurrency
        };
        Self {
            client,
            options,
            slots: Semaphore::new(capacity),
            progress: Box::new(LogProgress),
            transfers: AtomicU64::new(0),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressFactory>) -> Self {
        self.progress = progress;
        self
    }

    /// Number of network transfers attempted so far. Assets skipped by the
    /// size check never count.
    pub fn transfer_count(&self) -> u64 {
        self.transfers.load(Ordering::SeqCst)
    }

    /// Fetch every asset of `release`, then write the version manifest.
    ///
    /// All asset transfers are launched together and the call blocks until
    /// each has reached a terminal state; a failing asset does not cancel
    /// its siblings, and the first error is surfaced only after the rest
    /// have finished. The manifest is written only when every asset
    /// succeeded or was skipped, so it never references an asset that
    /// failed to materialize. Returns the manifest path.
    pub fn fetch(
        &self,
        launcher: &str,
        release: &Release,
        dest_base: &Path,
        is_latest: bool,
        token: &CancellationToken,
    ) -> Result<PathBuf> {
        if !storage::is_safe_component(launcher) {
            return Err(MirrorError::UnsafePath(launcher.to_string()));
        }
        let version = release.version_label();
        if !storage::is_safe_component(&version) {
            return Err(MirrorError::UnsafePath(version));
        }
        let dir = dest_base.join(launcher).join(&version);
        fs::create_dir_all(&dir)?;

        let results: Vec<Result<()>> = thread::scope(|scope| {
            let handles: Vec<_> = release
                .assets
                .iter()
                .map(|asset| {
                    let dir = &dir;
                    scope.spawn(move || {
                        let _permit = self.slots.acquire();
                        self.download_asset(asset, dir, token)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(MirrorError::Download("download worker panicked".to_string()))
                    })
                })
                .collect()
        });
        if let Some(error) = results.into_iter().find_map(|r| r.err()) {
            return Err(error);
        }

        let prefix = self.resolve_download_prefix();
        let manifest = Manifest {
            launcher: launcher.to_string(),
            tag_name: release.tag_name.clone(),
            name: release
                .name
                .clone()
                .unwrap_or_else(|| release.tag_name.clone()),
            published_at: release.published_at.unwrap_or_else(Utc::now),
            is_latest,
            assets: release
                .assets
                .iter()
                .map(|asset| ManifestAsset {
                    name: asset.name.clone(),
                    url: external_url(prefix.as_deref(), launcher, &version, asset),
                    size: asset.size,
                })
                .collect(),
        };
        let manifest_path = Manifest::manifest_path(&dir);
        manifest.save(&manifest_path)?;
        info!("Wrote manifest {}", manifest_path.display());
        Ok(manifest_path)
    }

    /// Prefix for the externally reachable URLs embedded in the manifest:
    /// explicit base URL, then server address:port, then a best-effort
    /// public address lookup. `None` keeps the upstream asset URLs.
    fn resolve_download_prefix(&self) -> Option<String> {
        if let Some(prefix) = self.options.url_policy.static_prefix() {
            return Some(prefix);
        }
        if self.options.url_policy.server_port == 0 {
            return None;
        }
        match self.discover_public_ip() {
            Ok(ip) => Some(self.options.url_policy.prefix_from_public_ip(&ip)),
            Err(e) => {
                warn!("Could not discover public address, keeping upstream URLs: {e}");
                None
            }
        }
    }

    fn discover_public_ip(&self) -> Result<String> {
        let mut response = self.client.get(PUBLIC_IP_ECHO_URL)?;
        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(MirrorError::Download(format!(
                "public address lookup returned status {status}"
            )));
        }
        let mut ip = String::new();
        response.read_to_string(&mut ip)?;
        let ip = ip.trim().to_string();
        if ip.is_empty() {
            return Err(MirrorError::Download(
                "public address lookup returned an empty body".to_string(),
            ));
        }
        Ok(ip)
    }

    fn download_asset(
        &self,
        asset: &ReleaseAsset,
        dir: &Path,
        token: &CancellationToken,
    ) -> Result<()> {
        if !storage::is_safe_component(&asset.name) {
            return Err(MirrorError::UnsafePath(asset.name.clone()));
        }
        let outfile = dir.join(&asset.name);

        // Size-only idempotence check; content is not re-validated.
        if let Ok(metadata) = fs::metadata(&outfile)
            && metadata.len() == asset.size
        {
            debug!("{} already mirrored with matching size, skipping", asset.name);
            return Ok(());
        }

        if asset.browser_download_url.is_empty() {
            warn!("Asset {} has no download URL, skipping", asset.name);
            return Ok(());
        }
        let url = self.options.rewrite.apply(&asset.browser_download_url);

        let mut reporter = self.progress.for_asset(&asset.name);
        let mut last_error = None;
        for attempt in 1..=self.options.retry_attempts.max(1) {
            if attempt > 1 {
                warn!(
                    "Download of {url} failed, retrying in {:?}",
                    self.options.retry_delay
                );
                if !wait_observing_cancellation(self.options.retry_delay, token) {
                    return Err(MirrorError::Cancelled);
                }
            }
            if token.is_cancelled() {
                return Err(MirrorError::Cancelled);
            }
            match self.try_transfer(&url, &outfile, dir, asset.size, reporter.as_mut()) {
                Ok(()) => {
                    reporter.on_complete();
                    debug!("Finished {}", outfile.display());
                    return Ok(());
                }
                // Filesystem trouble is not transient; fail the fetch now.
                Err(e @ MirrorError::Io(_)) => return Err(e),
                Err(e) => {
                    debug!("Attempt {attempt} for {url} failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| MirrorError::Download(format!("download of {url} failed"))))
    }

    /// One streaming transfer attempt into a temp sibling, renamed into
    /// place only after the body has been fully written and flushed, so
    /// concurrent readers never see a partial file under the final name.
    fn try_transfer(
        &self,
        url: &str,
        outfile: &Path,
        dir: &Path,
        expected_size: u64,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<()> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        let mut response = self
            .client
            .get(url)
            .map_err(|e| MirrorError::Download(format!("{url}: {e}")))?;
        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(MirrorError::Download(format!(
                "{url} returned status {status}"
            )));
        }

        let total = response
            .header("Content-Length")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(expected_size);
        reporter.on_start(total);

        let mut temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            let mut downloaded = 0u64;
            let mut buffer = vec![0; DOWNLOAD_CHUNK_SIZE];
            loop {
                match response.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        writer.write_all(&buffer[..n])?;
                        downloaded += n as u64;
                        reporter.on_progress(downloaded);
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        return Err(MirrorError::Download(format!("{url}: {e}")));
                    }
                }
            }
            writer.flush()?;
        }
        temp.persist(outfile).map_err(|e| MirrorError::Io(e.error))?;
        Ok(())
    }
}

fn external_url(
    prefix: Option<&str>,
    launcher: &str,
    version: &str,
    asset: &ReleaseAsset,
) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}/download/{launcher}/{version}/{}", asset.name),
        None => asset.browser_download_url.clone(),
    }
}

/// Sleeps for `delay` in short slices, returning false as soon as the token
/// is cancelled.
fn wait_observing_cancellation(delay: Duration, token: &CancellationToken) -> bool {
    let mut remaining = delay;
    while !remaining.is_zero() {
        if token.is_cancelled() {
            return false;
        }
        let slice = remaining.min(CANCEL_POLL_INTERVAL);
        thread::sleep(slice);
        remaining -= slice;
    }
    !token.is_cancelled()
}
