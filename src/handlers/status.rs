//! `status` and `statusline` handlers (spec §4.5/§6).

use crate::session::SessionManager;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct InstanceStatus {
    pub descriptor_id: String,
    pub language_id: String,
    pub state: String,
    pub pid: Option<u32>,
    pub open_documents: usize,
    /// Resident set size, best-effort. `None` off Linux or on a read failure
    /// — no hard dependency on a process-inspection crate for this.
    pub memory_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub workspace: String,
    pub uptime_secs: u64,
    pub instances: Vec<InstanceStatus>,
}

pub async fn status(session: &SessionManager, workspace: &Path, started_at: Instant) -> StatusSnapshot {
    let mut instances = Vec::new();
    for summary in session.list_instances().await {
        instances.push(InstanceStatus {
            memory_bytes: summary.pid.and_then(read_rss_bytes),
            descriptor_id: summary.descriptor_id,
            language_id: summary.language_id,
            state: summary.state,
            pid: summary.pid,
            open_documents: summary.open_documents,
        });
    }
    StatusSnapshot {
        workspace: workspace.display().to_string(),
        uptime_secs: started_at.elapsed().as_secs(),
        instances,
    }
}

/// Space-separated active server language ids, for statusline widgets.
pub async fn statusline(session: &SessionManager) -> String {
    session.active_language_ids().await.join(" ")
}

#[cfg(target_os = "linux")]
fn read_rss_bytes(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn read_rss_bytes(_pid: u32) -> Option<u64> {
    None
}
