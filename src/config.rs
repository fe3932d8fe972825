use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";

const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_TIMEOUT_MINUTES: u64 = 20;
const DEFAULT_CONCURRENT_DOWNLOADS: usize = 3;
const DEFAULT_CHECK_INTERVAL_MINUTES: u64 = 10;

/// One mirrored upstream project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Short launcher id; becomes the first path component under the base.
    pub name: String,
    /// Upstream repository URL, `https://github.com/<owner>/<repo>`.
    pub repo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MirrorConfig {
    /// Base directory that version directories are materialized under.
    pub storage_path: PathBuf,

    /// Address advertised in manifest download URLs, e.g. `http://mirror.example`.
    #[serde(default)]
    pub server_address: Option<String>,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// When set, wins over `server_address` as the manifest URL prefix.
    #[serde(default)]
    pub download_url_base: Option<String>,

    /// Outbound proxy for asset transfers.
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Literal prefix prepended to upstream asset URLs.
    #[serde(default)]
    pub asset_proxy_url: Option<String>,

    /// Mirror domain substituted for `https://github.com/` in asset URLs.
    #[serde(default)]
    pub mirror_domain: Option<String>,

    #[serde(default = "default_timeout_minutes")]
    pub download_timeout_minutes: u64,

    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,

    #[serde(default = "default_check_interval_minutes")]
    pub check_interval_minutes: u64,

    #[serde(default)]
    pub github_token: Option<String>,

    #[serde(default)]
    pub launchers: Vec<LauncherConfig>,
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_timeout_minutes() -> u64 {
    DEFAULT_TIMEOUT_MINUTES
}

fn default_concurrent_downloads() -> usize {
    DEFAULT_CONCURRENT_DOWNLOADS
}

fn default_check_interval_minutes() -> u64 {
    DEFAULT_CHECK_INTERVAL_MINUTES
}

impl MirrorConfig {
    /// Load the configuration from `<dir>/config.toml`.
    ///
    /// A missing storage path is a fatal configuration error; the
    /// `GITHUB_TOKEN` environment variable overrides the file value.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        let contents = fs::read_to_string(&config_path).map_err(|e| {
            MirrorError::ConfigFile(format!("Failed to read {}: {e}", config_path.display()))
        })?;
        let mut config: MirrorConfig = toml::from_str(&contents).map_err(|e| {
            MirrorError::ConfigFile(format!("Failed to parse {CONFIG_FILE_NAME}: {e}"))
        })?;

        if config.storage_path.as_os_str().is_empty() {
            return Err(MirrorError::InvalidConfig(
                "storage_path must not be empty".to_string(),
            ));
        }

        if let Ok(token) = std::env::var("GITHUB_TOKEN")
            && !token.is_empty()
        {
            config.github_token = Some(token);
        }

        log::debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| MirrorError::ConfigFile(format!("Failed to serialize config: {e}")))?;
        fs::write(&config_path, contents)?;
        log::debug!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Default configuration directory, `~/.relmirror`.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relmirror")
    }

    pub fn launcher(&self, name: &str) -> Result<&LauncherConfig> {
        self.launchers
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| MirrorError::UnknownLauncher(name.to_string()))
    }
}
