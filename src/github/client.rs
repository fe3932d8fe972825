use crate::error::{MirrorError, Result};
use crate::github::models::{RateLimit, Release};
use attohttpc::Session;
use log::debug;
use retry::{OperationResult, delay::Fixed, retry_with_index};
use std::time::Duration;

const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("relmirror/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: u64 = 30;
const MAX_RETRIES: u64 = 3;
const RETRY_DELAY_MS: u64 = 1000;

/// Client for the release-metadata collaborator.
///
/// Only the newest release of a repository is ever requested; alongside the
/// body, the quota headers are surfaced so callers can back off.
pub struct ReleaseClient {
    session: Session,
    base_url: String,
}

impl ReleaseClient {
    pub fn new(token: Option<&str>) -> Self {
        let mut session = Session::new();
        session.header("User-Agent", USER_AGENT);
        session.header("Accept", "application/vnd.github+json");
        if let Some(token) = token {
            session.header("Authorization", format!("Bearer {token}"));
        }
        session.timeout(Duration::from_secs(DEFAULT_TIMEOUT));
        session.proxy_settings(attohttpc::ProxySettings::from_env());

        Self {
            session,
            base_url: GITHUB_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Fetch the newest release of `owner/repo` together with the rate-limit
    /// signal from the response headers.
    pub fn latest_release(&self, owner: &str, repo: &str) -> Result<(Release, RateLimit)> {
        let url = format!("{}/repos/{owner}/{repo}/releases/latest", self.base_url);
        debug!("Fetching latest release from {url}");

        let result = retry_with_index(
            Fixed::from_millis(RETRY_DELAY_MS).take((MAX_RETRIES - 1) as usize),
            |attempt| match self.fetch_release(&url) {
                Ok(release) => OperationResult::Ok(release),
                // Quota exhaustion will not resolve within the retry window.
                Err(e @ MirrorError::RateLimited) => OperationResult::Err(e),
                Err(e) => {
                    debug!("Release fetch attempt {attempt} failed: {e}");
                    OperationResult::Retry(e)
                }
            },
        );
        result.map_err(|e| e.error)
    }

    fn fetch_release(&self, url: &str) -> Result<(Release, RateLimit)> {
        let response = self.session.get(url).send()?;
        let status = response.status();
        let rate = RateLimit::from_headers(
            response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok()),
            response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok()),
        );

        if status.as_u16() == 403 && rate.remaining == Some(0) {
            return Err(MirrorError::RateLimited);
        }
        if !status.is_success() {
            return Err(MirrorError::MetadataFetch(format!(
                "{url} returned status {status}"
            )));
        }

        let release: Release = response.json()?;
        Ok((release, rate))
    }
}

/// Extract owner and repository name from a `https://github.com/<owner>/<repo>`
/// URL as used in the launcher configuration.
pub fn parse_owner_repo(repo_url: &str) -> Result<(String, String)> {
    let rest = repo_url
        .strip_prefix("https://github.com/")
        .ok_or_else(|| {
            MirrorError::InvalidConfig(format!(
                "Invalid repository URL '{repo_url}', expected https://github.com/<owner>/<repo>"
            ))
        })?;
    let mut parts = rest.split('/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.trim_end_matches(".git").to_string()))
        }
        _ => Err(MirrorError::InvalidConfig(format!(
            "Invalid repository URL '{repo_url}', expected https://github.com/<owner>/<repo>"
        ))),
    }
}
