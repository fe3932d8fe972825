use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Upstream metadata for one published version. Immutable once fetched.
#[derive(Deserialize, Debug, Clone)]
pub struct Release {
    pub id: u64,
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl Release {
    /// The string the version directory is named after: the tag, else the
    /// display name, else the numeric release id.
    pub fn version_label(&self) -> String {
        if !self.tag_name.is_empty() {
            return self.tag_name.clone();
        }
        if let Some(name) = &self.name
            && !name.is_empty()
        {
            return name.clone();
        }
        self.id.to_string()
    }
}

/// Remaining-quota signal read off the release API response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub remaining: Option<u64>,
    pub reset: Option<DateTime<Utc>>,
}

/// Margin added on top of the advertised reset time.
const BACKOFF_MARGIN: Duration = Duration::from_secs(2);
/// Never sleep longer than this, whatever the reset header claims.
const MAX_BACKOFF: Duration = Duration::from_secs(15 * 60);

impl RateLimit {
    pub fn from_headers(remaining: Option<&str>, reset: Option<&str>) -> Self {
        Self {
            remaining: remaining.and_then(|v| v.parse().ok()),
            reset: reset
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }

    /// How long to sleep before the next metadata request, if the quota is
    /// exhausted. `None` means no backoff is needed.
    pub fn backoff(&self) -> Option<Duration> {
        if self.remaining != Some(0) {
            return None;
        }
        let reset = self.reset?;
        let until_reset = (reset - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Some((until_reset + BACKOFF_MARGIN).min(MAX_BACKOFF))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_parsing() {
        let limit = RateLimit::from_headers(Some("42"), Some("1719999999"));
        assert_eq!(limit.remaining, Some(42));
        assert!(limit.reset.is_some());

        let garbage = RateLimit::from_headers(Some("many"), Some("soon"));
        assert_eq!(garbage.remaining, None);
        assert_eq!(garbage.reset, None);
    }

    #[test]
    fn test_backoff_only_when_exhausted() {
        let fresh = RateLimit {
            remaining: Some(10),
            reset: Some(Utc::now() + chrono::Duration::seconds(60)),
        };
        assert_eq!(fresh.backoff(), None);

        let exhausted = RateLimit {
            remaining: Some(0),
            reset: Some(Utc::now() + chrono::Duration::seconds(60)),
        };
        let backoff = exhausted.backoff().unwrap();
        assert!(backoff >= Duration::from_secs(2));
        assert!(backoff <= Duration::from_secs(63));
    }

    #[test]
    fn test_backoff_is_capped() {
        let exhausted = RateLimit {
            remaining: Some(0),
            reset: Some(Utc::now() + chrono::Duration::hours(6)),
        };
        assert_eq!(exhausted.backoff(), Some(MAX_BACKOFF));
    }

    #[test]
    fn test_elapsed_reset_still_applies_margin() {
        let exhausted = RateLimit {
            remaining: Some(0),
            reset: Some(Utc::now() - chrono::Duration::seconds(30)),
        };
        assert_eq!(exhausted.backoff(), Some(BACKOFF_MARGIN));
    }
}
