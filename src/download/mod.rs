//! Asset download subsystem.
//!
//! Pulls every asset of a release in parallel through one bounded transfer
//! pool, with retry, skip-if-already-mirrored and atomic temp-then-rename
//! replacement, then writes the version manifest.

mod client;
mod fetcher;
mod options;
mod progress;
mod semaphore;

pub use client::{AttohttpcClient, HttpClient, HttpResponse};
pub use fetcher::AssetDownloader;
pub use options::{
    DEFAULT_CONCURRENT_DOWNLOADS, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT,
    DownloadUrlPolicy, FetchOptions, RewritePolicy,
};
pub use progress::{IndicatifProgress, LogProgress, ProgressFactory, ProgressReporter, SilentProgress};
pub use semaphore::{Semaphore, SemaphorePermit};
