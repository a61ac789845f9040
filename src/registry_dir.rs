//! Cross-daemon registry (C8): one JSON file per live daemon under
//! `<stateDir>/daemons/`, so `list`/`stop-all`/post-install cleanup can see
//! every running daemon without talking to each one first.
//!
//! Named `registry_dir` rather than `registry` to keep it distinct from C3's
//! server-descriptor table.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRecord {
    pub workspace: String,
    pub pid: u32,
    pub socket_path: String,
    pub started_at: u64,
    pub version: String,
}

impl DaemonRecord {
    pub fn new(workspace: &Path, pid: u32, socket_path: &Path) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            workspace: workspace.display().to_string(),
            pid,
            socket_path: socket_path.display().to_string(),
            started_at,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn daemons_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("daemons")
}

/// Write this daemon's record, creating `<stateDir>/daemons/` if needed.
pub fn register(state_dir: &Path, hash: &str, record: &DaemonRecord) -> std::io::Result<()> {
    let dir = daemons_dir(state_dir);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{hash}.json"));
    let body = serde_json::to_vec_pretty(record)?;
    std::fs::write(path, body)
}

/// Remove this daemon's record. Best-effort — a missing file is not an error.
pub fn unregister(state_dir: &Path, hash: &str) {
    let path = daemons_dir(state_dir).join(format!("{hash}.json"));
    let _ = std::fs::remove_file(path);
}

/// Every daemon record that still points at a live process, garbage
/// collecting stale entries (unreachable PID) as it goes.
pub fn list_live(state_dir: &Path) -> Vec<DaemonRecord> {
    let dir = daemons_dir(state_dir);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut live = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(body) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(record) = serde_json::from_str::<DaemonRecord>(&body) else {
            let _ = std::fs::remove_file(&path);
            continue;
        };
        if process_alive(record.pid) {
            live.push(record);
        } else {
            let _ = std::fs::remove_file(&path);
        }
    }
    live
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // kill(pid, 0) only checks existence/permission, sends nothing.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}
