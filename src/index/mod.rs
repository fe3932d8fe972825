use crate::error::Result;
use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::version::{self, StabilityClassifier};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use walkdir::WalkDir;

/// Concurrency-safe registry of (launcher, version) -> manifest path, with a
/// derived latest pointer per launcher.
///
/// The manifest files on disk are the source of truth; the index is a cache
/// over them and can be rebuilt at any time with [`VersionIndex::init_from_disk`].
/// One reader/writer lock covers the whole composite structure (mappings,
/// latest pointers and the manifest content cache), so readers never observe
/// a half-updated latest pointer. The latest pointer is recomputed
/// synchronously inside every mutating operation.
pub struct VersionIndex {
    base: PathBuf,
    classifier: StabilityClassifier,
    inner: RwLock<IndexState>,
}

#[derive(Default)]
struct IndexState {
    /// launcher -> version -> manifest path
    versions: HashMap<String, HashMap<String, PathBuf>>,
    /// launcher -> latest version string
    latest: HashMap<String, String>,
    /// Parsed manifest contents keyed by file path.
    manifests: HashMap<PathBuf, Manifest>,
}

impl VersionIndex {
    pub fn new(base: PathBuf) -> Self {
        Self::with_classifier(base, StabilityClassifier::default())
    }

    pub fn with_classifier(base: PathBuf, classifier: StabilityClassifier) -> Self {
        Self {
            base,
            classifier,
            inner: RwLock::new(IndexState::default()),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Upsert one (launcher, version) mapping and recompute the launcher's
    /// latest pointer.
    ///
    /// The manifest content is re-read from disk on every call, so repeating
    /// the call with identical arguments refreshes the cache but leaves the
    /// observable index state unchanged. An unreadable manifest leaves a
    /// mapping without cached content; queries will degrade by omitting it.
    pub fn update(&self, launcher: &str, ver: &str, manifest_path: &Path) {
        let manifest = match Manifest::load(manifest_path) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(
                    "Manifest {} is unreadable, indexing without content: {e}",
                    manifest_path.display()
                );
                None
            }
        };

        let mut state = self.inner.write().unwrap();
        state
            .versions
            .entry(launcher.to_string())
            .or_default()
            .insert(ver.to_string(), manifest_path.to_path_buf());
        if let Some(manifest) = manifest {
            state.manifests.insert(manifest_path.to_path_buf(), manifest);
        }
        self.recompute_latest(&mut state, launcher);
        debug!(
            "Indexed {launcher} {ver}; latest is now {:?}",
            state.latest.get(launcher)
        );
    }

    /// Drop one version and recompute the launcher's latest pointer from the
    /// remaining versions. Removing the last version clears the pointer.
    pub fn remove(&self, launcher: &str, ver: &str) {
        let mut state = self.inner.write().unwrap();
        let Some(versions) = state.versions.get_mut(launcher) else {
            return;
        };
        if let Some(path) = versions.remove(ver) {
            state.manifests.remove(&path);
        }
        if state.versions.get(launcher).is_some_and(|v| v.is_empty()) {
            state.versions.remove(launcher);
        }
        self.recompute_latest(&mut state, launcher);
    }

    pub fn latest_version(&self, launcher: &str) -> Option<String> {
        self.inner.read().unwrap().latest.get(launcher).cloned()
    }

    pub fn contains(&self, launcher: &str, ver: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .versions
            .get(launcher)
            .is_some_and(|v| v.contains_key(ver))
    }

    pub fn version_count(&self, launcher: &str) -> usize {
        self.inner
            .read()
            .unwrap()
            .versions
            .get(launcher)
            .map_or(0, |v| v.len())
    }

    /// launcher -> latest version string, for every launcher with a pointer.
    pub fn latest_map(&self) -> BTreeMap<String, String> {
        self.inner
            .read()
            .unwrap()
            .latest
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// All manifests of one launcher, sorted descending by version.
    ///
    /// Cache misses fall back to a disk read and populate the cache as a
    /// side effect; versions whose manifest has disappeared are omitted
    /// rather than failing the query.
    pub fn launcher_manifests(&self, launcher: &str) -> Option<Vec<Manifest>> {
        let mut state = self.inner.write().unwrap();
        if !state.versions.contains_key(launcher) {
            return None;
        }
        Some(Self::collect_manifests(&mut state, launcher))
    }

    /// Every launcher's manifests, sorted descending by version.
    pub fn all_manifests(&self) -> BTreeMap<String, Vec<Manifest>> {
        let mut state = self.inner.write().unwrap();
        let launchers: Vec<String> = state.versions.keys().cloned().collect();
        launchers
            .into_iter()
            .map(|launcher| {
                let manifests = Self::collect_manifests(&mut state, &launcher);
                (launcher, manifests)
            })
            .collect()
    }

    /// The single latest manifest per launcher.
    pub fn latest_manifests(&self) -> BTreeMap<String, Manifest> {
        let mut state = self.inner.write().unwrap();
        let pointers: Vec<(String, String)> = state
            .latest
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut result = BTreeMap::new();
        for (launcher, ver) in pointers {
            let Some(path) = state
                .versions
                .get(&launcher)
                .and_then(|v| v.get(&ver))
                .cloned()
            else {
                continue;
            };
            if let Some(manifest) = Self::cached_or_load(&mut state, &path) {
                result.insert(launcher, manifest);
            }
        }
        result
    }

    /// Rewrite every flagged manifest of the launcher with `is_latest = false`.
    ///
    /// Used when a newly ingested release supersedes a version that was
    /// explicitly flagged latest. Files are rewritten outside the lock;
    /// unreadable or unwritable manifests are logged and skipped so one bad
    /// file cannot wedge the whole launcher.
    pub fn clear_latest_flags(&self, launcher: &str) -> Result<()> {
        let paths: Vec<PathBuf> = {
            let state = self.inner.read().unwrap();
            let Some(versions) = state.versions.get(launcher) else {
                return Ok(());
            };
            versions
                .values()
                .filter(|path| {
                    // Skip files the cache already knows are unflagged.
                    state.manifests.get(*path).is_none_or(|m| m.is_latest)
                })
                .cloned()
                .collect()
        };

        for path in paths {
            if let Err(e) = self.clear_latest_flag(&path) {
                warn!("Failed to clear latest flag on {}: {e}", path.display());
            }
        }
        Ok(())
    }

    fn clear_latest_flag(&self, path: &Path) -> Result<()> {
        let mut manifest = {
            let state = self.inner.read().unwrap();
            match state.manifests.get(path) {
                Some(m) => m.clone(),
                None => Manifest::load(path)?,
            }
        };

        if manifest.is_latest {
            manifest.is_latest = false;
            manifest.save(path)?;
            debug!("Cleared latest flag on {}", path.display());
        }

        let mut state = self.inner.write().unwrap();
        state.manifests.insert(path.to_path_buf(), manifest);
        Ok(())
    }

    /// Rebuild the index from a full walk of the base directory.
    ///
    /// Finds every `<base>/<launcher>/<version>/index.json` and ingests it
    /// exactly as an incremental `update` would, so a rebuilt index answers
    /// queries identically to one built release by release.
    pub fn init_from_disk(&self) -> Result<()> {
        for entry in WalkDir::new(&self.base).min_depth(3).max_depth(3) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry during index rebuild: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() != MANIFEST_FILE {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.base) else {
                continue;
            };
            let mut components = rel.components();
            let (Some(launcher), Some(ver)) = (components.next(), components.next()) else {
                continue;
            };
            let launcher = launcher.as_os_str().to_string_lossy().into_owned();
            let ver = ver.as_os_str().to_string_lossy().into_owned();
            self.update(&launcher, &ver, entry.path());
        }
        Ok(())
    }

    /// Recompute one launcher's latest pointer. Called with the write lock
    /// held by every mutating operation.
    fn recompute_latest(&self, state: &mut IndexState, launcher: &str) {
        let latest = state
            .versions
            .get(launcher)
            .map(|versions| self.pick_latest(&state.manifests, versions))
            .unwrap_or_default();
        if latest.is_empty() {
            state.latest.remove(launcher);
        } else {
            state.latest.insert(launcher.to_string(), latest);
        }
    }

    /// Latest-resolution: the comparator-maximum of the explicitly flagged
    /// versions when any exist (deterministic even if concurrent writers
    /// left more than one flag), otherwise the maximum stable version,
    /// otherwise the maximum pre-release, otherwise empty.
    fn pick_latest(
        &self,
        manifests: &HashMap<PathBuf, Manifest>,
        versions: &HashMap<String, PathBuf>,
    ) -> String {
        let flagged: Vec<&str> = versions
            .iter()
            .filter(|(_, path)| {
                let cached = manifests.get(*path);
                match cached {
                    Some(m) => m.is_latest,
                    // Cache miss: read the file directly. The cache itself is
                    // only updated by `update` and `clear_latest_flag`, never
                    // while picking.
                    None => Manifest::load(path).map(|m| m.is_latest).unwrap_or(false),
                }
            })
            .map(|(v, _)| v.as_str())
            .collect();
        if let Some(max) = version::max_version(flagged) {
            return max.to_string();
        }

        let (stable, unstable): (Vec<&str>, Vec<&str>) = versions
            .keys()
            .map(|v| v.as_str())
            .partition(|v| self.classifier.is_stable(v));

        version::max_version(stable)
            .or_else(|| version::max_version(unstable))
            .map(|v| v.to_string())
            .unwrap_or_default()
    }

    fn collect_manifests(state: &mut IndexState, launcher: &str) -> Vec<Manifest> {
        let paths: Vec<(String, PathBuf)> = state
            .versions
            .get(launcher)
            .map(|versions| {
                versions
                    .iter()
                    .map(|(v, p)| (v.clone(), p.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let mut entries: Vec<(String, Manifest)> = paths
            .into_iter()
            .filter_map(|(ver, path)| {
                Self::cached_or_load(state, &path).map(|manifest| (ver, manifest))
            })
            .collect();
        entries.sort_by(|(a, _), (b, _)| version::compare(b, a).then_with(|| b.cmp(a)));
        entries.into_iter().map(|(_, m)| m).collect()
    }

    fn cached_or_load(state: &mut IndexState, path: &Path) -> Option<Manifest> {
        if let Some(manifest) = state.manifests.get(path) {
            return Some(manifest.clone());
        }
        match Manifest::load(path) {
            Ok(manifest) => {
                state.manifests.insert(path.to_path_buf(), manifest.clone());
                Some(manifest)
            }
            Err(e) => {
                warn!(
                    "Omitting {} from listing, manifest unreadable: {e}",
                    path.display()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestAsset;
    use chrono::Utc;
    use tempfile::TempDir;

    fn write_manifest(base: &Path, launcher: &str, ver: &str, is_latest: bool) -> PathBuf {
        let dir = base.join(launcher).join(ver);
        let manifest = Manifest {
            launcher: launcher.to_string(),
            tag_name: ver.to_string(),
            name: format!("{launcher} {ver}"),
            published_at: Utc::now(),
            is_latest,
            assets: vec![ManifestAsset {
                name: format!("{launcher}.apk"),
                url: format!("http://mirror.example/download/{launcher}/{ver}/{launcher}.apk"),
                size: 42,
            }],
        };
        let path = Manifest::manifest_path(&dir);
        manifest.save(&path).unwrap();
        path
    }

    fn ingest(index: &VersionIndex, launcher: &str, ver: &str, is_latest: bool) -> PathBuf {
        let path = write_manifest(index.base(), launcher, ver, is_latest);
        index.update(launcher, ver, &path);
        path
    }

    #[test]
    fn test_latest_prefers_stable_over_prerelease() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        ingest(&index, "fcl", "v1.2.3", false);
        ingest(&index, "fcl", "v1.2.4-rc", false);

        assert_eq!(index.latest_version("fcl").as_deref(), Some("v1.2.3"));
    }

    #[test]
    fn test_latest_falls_back_to_prerelease() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        ingest(&index, "fcl", "v1.0.0-beta1", false);
        ingest(&index, "fcl", "v1.0.0-beta2", false);

        assert_eq!(
            index.latest_version("fcl").as_deref(),
            Some("v1.0.0-beta2")
        );
    }

    #[test]
    fn test_flagged_version_wins_over_comparator() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        ingest(&index, "zl", "141000", false);
        ingest(&index, "zl", "140900", true);

        // The explicit flag beats the larger version number.
        assert_eq!(index.latest_version("zl").as_deref(), Some("140900"));
    }

    #[test]
    fn test_multiple_flags_resolve_to_comparator_maximum() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        ingest(&index, "zl", "141000", true);
        ingest(&index, "zl", "140900", true);

        assert_eq!(index.latest_version("zl").as_deref(), Some("141000"));
    }

    #[test]
    fn test_remove_rolls_back_latest_pointer() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        ingest(&index, "zl", "141000", false);
        ingest(&index, "zl", "140900", false);
        assert_eq!(index.latest_version("zl").as_deref(), Some("141000"));

        index.remove("zl", "141000");
        assert_eq!(index.latest_version("zl").as_deref(), Some("140900"));

        index.remove("zl", "140900");
        assert_eq!(index.latest_version("zl"), None);
    }

    #[test]
    fn test_launchers_are_independent() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        ingest(&index, "fcl", "v1.0.0", false);
        ingest(&index, "zl", "140900", false);

        assert_eq!(index.latest_version("fcl").as_deref(), Some("v1.0.0"));
        assert_eq!(index.latest_version("zl").as_deref(), Some("140900"));

        index.remove("fcl", "v1.0.0");
        assert_eq!(index.latest_version("fcl"), None);
        assert_eq!(index.latest_version("zl").as_deref(), Some("140900"));
    }

    #[test]
    fn test_update_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        let path = ingest(&index, "fcl", "v1.0.0", false);
        index.update("fcl", "v1.0.0", &path);
        index.update("fcl", "v1.0.0", &path);

        assert_eq!(index.version_count("fcl"), 1);
        assert_eq!(index.latest_version("fcl").as_deref(), Some("v1.0.0"));
    }

    #[test]
    fn test_clear_latest_flags_rewrites_manifests() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        let flagged = ingest(&index, "fcl", "v1.0.0", true);
        let plain = ingest(&index, "fcl", "v0.9.0", false);

        index.clear_latest_flags("fcl").unwrap();

        assert!(!Manifest::load(&flagged).unwrap().is_latest);
        assert!(!Manifest::load(&plain).unwrap().is_latest);
        // Cache refreshed too: resolution now follows the comparator.
        assert_eq!(index.latest_version("fcl").as_deref(), Some("v1.0.0"));
    }

    #[test]
    fn test_init_from_disk_matches_incremental_build() {
        let temp_dir = TempDir::new().unwrap();
        let incremental = VersionIndex::new(temp_dir.path().to_path_buf());
        // Ingestion order deliberately scrambled.
        ingest(&incremental, "zl", "140900", false);
        ingest(&incremental, "fcl", "v1.0.0", true);
        ingest(&incremental, "zl", "141000", false);
        ingest(&incremental, "fcl", "v0.9.0", false);

        let rebuilt = VersionIndex::new(temp_dir.path().to_path_buf());
        rebuilt.init_from_disk().unwrap();

        assert_eq!(rebuilt.latest_map(), incremental.latest_map());
        assert_eq!(rebuilt.all_manifests(), incremental.all_manifests());
    }

    #[test]
    fn test_missing_manifest_is_omitted_from_listing() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        ingest(&index, "fcl", "v1.0.0", false);

        // Index an entry whose manifest never made it to disk. The version
        // stays indexed but queries degrade by leaving it out.
        let phantom = temp_dir.path().join("fcl").join("v1.1.0").join("index.json");
        index.update("fcl", "v1.1.0", &phantom);

        assert_eq!(index.version_count("fcl"), 2);
        let manifests = index.launcher_manifests("fcl").unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].tag_name, "v1.0.0");
    }

    #[test]
    fn test_listing_sorted_descending() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        ingest(&index, "zl", "140900", false);
        ingest(&index, "zl", "141000", false);
        ingest(&index, "zl", "140800", false);

        let manifests = index.launcher_manifests("zl").unwrap();
        let tags: Vec<&str> = manifests.iter().map(|m| m.tag_name.as_str()).collect();
        assert_eq!(tags, vec!["141000", "140900", "140800"]);
    }

    #[test]
    fn test_latest_manifests_returns_one_per_launcher() {
        let temp_dir = TempDir::new().unwrap();
        let index = VersionIndex::new(temp_dir.path().to_path_buf());
        ingest(&index, "fcl", "v1.0.0", false);
        ingest(&index, "zl", "140900", false);
        ingest(&index, "zl", "141000", false);

        let latest = index.latest_manifests();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["fcl"].tag_name, "v1.0.0");
        assert_eq!(latest["zl"].tag_name, "141000");
    }
}
