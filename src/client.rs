//! Client launcher (C7): connect to an existing daemon, or spawn one
//! detached and poll until it's reachable.

use crate::error::LspcError;
use crate::handlers::{DaemonRequest, DaemonResponse};
use crate::paths::WorkspacePaths;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const POLL_ATTEMPTS: u32 = 50;

/// Connect to the daemon for `paths.workspace`, spawning one detached if
/// none is reachable yet, then send `command`/`args`/`config_file` and
/// return its response.
pub async fn connect_or_spawn(
    paths: &WorkspacePaths,
    command: &str,
    args: Vec<String>,
    config_file: Option<String>,
) -> Result<DaemonResponse, LspcError> {
    let stream = match connect(&paths.socket_path).await {
        Ok(stream) => stream,
        Err(LspcError::ConnectionRefused(_)) => {
            spawn_detached_daemon(paths)?;
            wait_for_daemon(&paths.socket_path).await?
        }
        Err(e) => return Err(e),
    };

    send_request(stream, command, args, config_file).await
}

/// Send a request only if a daemon is already reachable — never spawns
/// one. Returns `Ok(None)` when nothing is listening, which callers that
/// only want to act on an already-running daemon (e.g. `stop`) treat as a
/// no-op rather than an error.
pub async fn send_if_running(
    paths: &WorkspacePaths,
    command: &str,
    args: Vec<String>,
    config_file: Option<String>,
) -> Result<Option<DaemonResponse>, LspcError> {
    match connect(&paths.socket_path).await {
        Ok(stream) => send_request(stream, command, args, config_file).await.map(Some),
        Err(LspcError::ConnectionRefused(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn connect(socket_path: &std::path::Path) -> Result<UnixStream, LspcError> {
    UnixStream::connect(socket_path)
        .await
        .map_err(|_| LspcError::ConnectionRefused(socket_path.display().to_string()))
}

async fn wait_for_daemon(socket_path: &std::path::Path) -> Result<UnixStream, LspcError> {
    for attempt in 0..POLL_ATTEMPTS {
        if let Ok(stream) = connect(socket_path).await {
            debug!(attempt, "daemon became reachable");
            return Ok(stream);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Err(LspcError::DaemonStartTimeout)
}

async fn send_request(
    mut stream: UnixStream,
    command: &str,
    args: Vec<String>,
    config_file: Option<String>,
) -> Result<DaemonResponse, LspcError> {
    let request = DaemonRequest {
        command: command.to_string(),
        args,
        config_file,
    };
    let body = serde_json::to_vec(&request).map_err(|e| LspcError::InvalidRequest(e.to_string()))?;
    stream.write_all(&body).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    serde_json::from_slice(&buf).map_err(|e| LspcError::ProtocolError(e.to_string()))
}

/// Spawn `current_exe() daemon --log-file <logPath>` fully detached: its own
/// session, stdio redirected away from this client's, so this process can
/// exit independently of it.
fn spawn_detached_daemon(paths: &WorkspacePaths) -> Result<(), LspcError> {
    if let Some(parent) = paths.log_path.parent() {
        std::fs::create_dir_all(parent).map_err(LspcError::IoError)?;
    }

    let exe = std::env::current_exe().map_err(LspcError::IoError)?;
    let mut cmd = std::process::Command::new(exe);
    cmd.arg("daemon")
        .arg("--workspace")
        .arg(&paths.workspace)
        .arg("--log-file")
        .arg(&paths.log_path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    detach(&mut cmd);

    cmd.spawn()
        .map_err(|e| LspcError::ServerSpawnFailed(format!("failed to spawn daemon: {e}")))?;
    info!(workspace = %paths.workspace.display(), "spawned detached daemon");
    Ok(())
}

#[cfg(unix)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.pre_exec(|| {
            // Break away from the client's session so the daemon survives
            // the client's exit; failure here is non-fatal to the daemon.
            libc::setsid();
            Ok(())
        });
    }
}

#[cfg(windows)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_fails_with_connection_refused_when_no_socket() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.sock");
        let err = connect(&missing).await.unwrap_err();
        assert!(matches!(err, LspcError::ConnectionRefused(_)));
    }
}
