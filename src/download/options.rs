use std::time::Duration;

/// Default timeout for one asset transfer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Pool size used when the configured value is zero.
pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 3;

pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Options for one [`AssetDownloader`](super::AssetDownloader).
///
/// The concurrency bound applies across every concurrent `fetch` call made
/// through the same downloader, not per release.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Overall per-request timeout.
    pub timeout: Duration,

    /// Capacity of the shared transfer pool; `0` falls back to the default.
    pub concurrency: usize,

    /// Outbound proxy URL for asset transfers.
    pub proxy: Option<String>,

    /// Source URL rewriting applied before each transfer.
    pub rewrite: RewritePolicy,

    /// How the externally reachable URLs embedded in the manifest are built.
    pub url_policy: DownloadUrlPolicy,

    /// Total attempts per asset before the error becomes permanent.
    pub retry_attempts: usize,

    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENT_DOWNLOADS,
            proxy: None,
            rewrite: RewritePolicy::default(),
            url_policy: DownloadUrlPolicy::default(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Rewrites upstream asset URLs before the transfer is issued.
///
/// A literal prefix (a pass-through proxy) is applied first, then ordered
/// prefix substitutions, e.g. `https://github.com/` -> `<mirror>/gh/`.
#[derive(Debug, Clone, Default)]
pub struct RewritePolicy {
    pub prefix: Option<String>,
    pub substitutions: Vec<(String, String)>,
}

impl RewritePolicy {
    pub fn apply(&self, url: &str) -> String {
        let mut rewritten = match &self.prefix {
            Some(prefix) => format!("{prefix}{url}"),
            None => url.to_string(),
        };
        for (from, to) in &self.substitutions {
            if rewritten.starts_with(from.as_str()) {
                rewritten = format!("{to}{}", &rewritten[from.len()..]);
                break;
            }
        }
        rewritten
    }
}

/// Priority order for the download URL written into the manifest:
/// explicit base URL, then explicit server address and port, then a
/// best-effort discovered public address. When none resolves, the manifest
/// keeps the upstream URL.
#[derive(Debug, Clone, Default)]
pub struct DownloadUrlPolicy {
    pub base_url: Option<String>,
    pub server_address: Option<String>,
    pub server_port: u16,
}

impl DownloadUrlPolicy {
    /// The prefix derivable without any network round trip.
    pub fn static_prefix(&self) -> Option<String> {
        if let Some(base) = &self.base_url {
            return Some(base.trim_end_matches('/').to_string());
        }
        self.server_address
            .as_ref()
            .map(|address| format!("{}:{}", address.trim_end_matches('/'), self.server_port))
    }

    pub fn prefix_from_public_ip(&self, ip: &str) -> String {
        format!("http://{}:{}", ip.trim(), self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = FetchOptions::default();
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert_eq!(options.concurrency, DEFAULT_CONCURRENT_DOWNLOADS);
        assert_eq!(options.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert!(options.proxy.is_none());
    }

    #[test]
    fn test_rewrite_prefix_then_substitution() {
        let policy = RewritePolicy {
            prefix: None,
            substitutions: vec![(
                "https://github.com/".to_string(),
                "https://xget.example/gh/".to_string(),
            )],
        };
        assert_eq!(
            policy.apply("https://github.com/owner/repo/releases/download/v1/a.apk"),
            "https://xget.example/gh/owner/repo/releases/download/v1/a.apk"
        );

        // A pass-through proxy prefix hides the upstream host, so the
        // substitution no longer matches.
        let proxied = RewritePolicy {
            prefix: Some("https://proxy.example/".to_string()),
            substitutions: vec![(
                "https://github.com/".to_string(),
                "https://xget.example/gh/".to_string(),
            )],
        };
        assert_eq!(
            proxied.apply("https://github.com/owner/repo/a.apk"),
            "https://proxy.example/https://github.com/owner/repo/a.apk"
        );
    }

    #[test]
    fn test_url_policy_priority() {
        let policy = DownloadUrlPolicy {
            base_url: Some("https://mirror.example/".to_string()),
            server_address: Some("http://10.0.0.1".to_string()),
            server_port: 8080,
        };
        assert_eq!(
            policy.static_prefix().as_deref(),
            Some("https://mirror.example")
        );

        let policy = DownloadUrlPolicy {
            base_url: None,
            server_address: Some("http://10.0.0.1".to_string()),
            server_port: 8080,
        };
        assert_eq!(
            policy.static_prefix().as_deref(),
            Some("http://10.0.0.1:8080")
        );

        let policy = DownloadUrlPolicy {
            base_url: None,
            server_address: None,
            server_port: 8080,
        };
        assert_eq!(policy.static_prefix(), None);
        assert_eq!(
            policy.prefix_from_public_ip("203.0.113.9\n"),
            "http://203.0.113.9:8080"
        );
    }
}
