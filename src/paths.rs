//! Workspace identity and filesystem layout (C1).
//!
//! Derives a stable, deterministic identity for a workspace directory and
//! the socket/log/pid paths that hang off it, plus project-root detection
//! by walking upward for root markers.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Per-workspace filesystem layout, all rooted under the user state dir.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    /// Canonicalized workspace directory this daemon answers for.
    pub workspace: PathBuf,
    /// Stable hex digest of `workspace`, used as the filename stem for
    /// everything below.
    pub hash: String,
    pub socket_path: PathBuf,
    pub log_path: PathBuf,
    pub pid_path: PathBuf,
}

impl WorkspacePaths {
    /// Derive all paths for `workspace`. `workspace` need not exist yet on
    /// disk for path derivation, but canonicalization requires it to exist;
    /// callers that need paths before creating a directory should pass an
    /// already-canonical path.
    pub fn derive(workspace: &Path) -> std::io::Result<Self> {
        let canonical = workspace.canonicalize()?;
        let hash = hash_workspace(&canonical);
        let state_dir = state_dir();

        Ok(Self {
            workspace: canonical,
            socket_path: socket_path_for(&state_dir, &hash),
            log_path: state_dir.join("logs").join(format!("{hash}.log")),
            pid_path: state_dir.join("daemons").join(format!("{hash}.json")),
            hash,
        })
    }
}

/// Hex SHA-256 of the canonical workspace path string.
///
/// Deterministic across runs and processes, which is the only requirement
/// spec §4.1 places on it.
fn hash_workspace(canonical: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(unix)]
fn socket_path_for(state_dir: &Path, hash: &str) -> PathBuf {
    state_dir.join("sockets").join(format!("{hash}.sock"))
}

#[cfg(windows)]
fn socket_path_for(_state_dir: &Path, hash: &str) -> PathBuf {
    // Named pipes live in a flat namespace, not the filesystem.
    PathBuf::from(format!(r"\\.\pipe\lspc-{hash}"))
}

/// The root of all lspc on-disk state: sockets, logs, PID files, config.
///
/// Mirrors the manual, dependency-free platform branching the rest of this
/// codebase's lineage uses for its own data directory rather than pulling in
/// a `dirs`-style crate.
pub fn state_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("lspc");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("lspc");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local").join("state").join("lspc");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(local).join("lspc");
        }
    }
    // Fallback for unsupported platforms or missing env vars.
    std::env::temp_dir().join("lspc")
}

/// Ascend from `file`'s parent directory looking for any of `root_markers`
/// (a relative filename or directory name). Falls back to `file`'s parent
/// directory when no marker is found anywhere up to the filesystem root.
pub fn find_project_root(file: &Path, root_markers: &[String]) -> PathBuf {
    let start = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut dir = start.as_path();
    loop {
        if root_markers.iter().any(|marker| dir.join(marker).exists()) {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash_workspace(Path::new("/tmp/project"));
        let b = hash_workspace(Path::new("/tmp/project"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_differs_by_path() {
        let a = hash_workspace(Path::new("/tmp/project-a"));
        let b = hash_workspace(Path::new("/tmp/project-b"));
        assert_ne!(a, b);
    }

    #[test]
    fn find_project_root_walks_up_to_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("go.mod"), "module x").unwrap();
        let sub = root.join("pkg").join("inner");
        std::fs::create_dir_all(&sub).unwrap();
        let file = sub.join("main.go");
        std::fs::write(&file, "package x").unwrap();

        let found = find_project_root(&file, &["go.mod".to_string()]);
        assert_eq!(found, root);
    }

    #[test]
    fn find_project_root_falls_back_to_parent_when_no_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("lone.py");
        std::fs::write(&file, "x = 1").unwrap();

        let found = find_project_root(&file, &["pyproject.toml".to_string()]);
        assert_eq!(found, tmp.path());
    }
}
