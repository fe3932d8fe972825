use crate::error::{MirrorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// File name of the per-version manifest inside a version directory.
pub const MANIFEST_FILE: &str = "index.json";

/// Persisted record for one (launcher, version) pair.
///
/// The manifest files are the source of truth; the in-memory index is a
/// cache over them. A manifest is written whole after every asset of its
/// release has been materialized, and mutated afterwards only to flip the
/// `is_latest` marker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Manifest {
    pub launcher: String,
    pub tag_name: String,
    pub name: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default)]
    pub assets: Vec<ManifestAsset>,
}

/// One mirrored asset with its externally reachable download URL.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManifestAsset {
    pub name: String,
    pub url: String,
    pub size: u64,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| MirrorError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write the manifest as one whole file.
    ///
    /// The JSON is staged in a sibling temp file and renamed into place, so
    /// a concurrent reader never observes a partially written manifest.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            MirrorError::InvalidManifest {
                path: path.to_path_buf(),
                reason: "manifest path has no parent directory".to_string(),
            }
        })?;
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(self)?;
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(json.as_bytes())?;
        temp.flush()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn manifest_path(dir: &Path) -> std::path::PathBuf {
        dir.join(MANIFEST_FILE)
    }
}
