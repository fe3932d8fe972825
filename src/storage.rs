use crate::error::{MirrorError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// One node of the mirrored file tree, as exposed to the admin layer.
#[derive(Serialize, Debug, Clone)]
pub struct FileNode {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

/// Returns true when the string is usable as a single path component.
///
/// Launcher ids, version strings and asset names all end up as directory or
/// file names under the storage base, so anything that could escape the
/// version directory is rejected.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Checks whether a slash- or backslash-separated path contains a
/// parent-directory segment.
pub fn contains_dot_dot(path: &str) -> bool {
    if !path.contains("..") {
        return false;
    }
    path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Resolve `rel` under `base`, refusing any path that would escape it.
fn resolve_under(base: &Path, rel: &str) -> Result<PathBuf> {
    if contains_dot_dot(rel) {
        return Err(MirrorError::UnsafePath(rel.to_string()));
    }
    let joined = base.join(rel);
    // Joining an absolute path replaces the base entirely; reject that too.
    if Path::new(rel)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(MirrorError::UnsafePath(rel.to_string()));
    }
    Ok(joined)
}

/// Recursively list the tree rooted at `base/rel`.
pub fn list_tree(base: &Path, rel: &str) -> Result<FileNode> {
    let root = resolve_under(base, rel)?;
    let metadata = fs::metadata(&root)?;
    build_node(&root, metadata.is_dir(), metadata.len())
}

fn build_node(path: &Path, is_dir: bool, size: u64) -> Result<FileNode> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut node = FileNode {
        name,
        is_dir,
        size,
        children: Vec::new(),
    };
    if !is_dir {
        return Ok(node);
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        node.children
            .push(build_node(&entry.path(), metadata.is_dir(), metadata.len())?);
    }
    Ok(node)
}

/// Delete one version directory and everything in it.
///
/// This is the admin-layer file removal; it is independent of the index, so
/// callers that also want the version gone from queries must call
/// `VersionIndex::remove` themselves.
pub fn remove_version_dir(base: &Path, launcher: &str, version: &str) -> Result<()> {
    if !is_safe_component(launcher) {
        return Err(MirrorError::UnsafePath(launcher.to_string()));
    }
    if !is_safe_component(version) {
        return Err(MirrorError::UnsafePath(version.to_string()));
    }
    let dir = base.join(launcher).join(version);
    fs::remove_dir_all(&dir)?;
    Ok(())
}
