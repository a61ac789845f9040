//! `stop` and `logs` handlers (spec §4.5/§6).
//!
//! `start`, `stop-all`, and `list` never reach the daemon dispatcher — they
//! are resolved client-side against C8's registry directory, since they
//! either spawn a daemon or act across every workspace's daemon at once.

use crate::paths::WorkspacePaths;
use crate::session::SessionManager;

/// Tear down every language-server instance this daemon owns. The caller
/// (the daemon's connection loop) is responsible for responding to the
/// client and then unwinding the listener — this only stops the instances.
pub async fn stop(session: &SessionManager) {
    session.shutdown_all().await;
}

pub fn logs(paths: &WorkspacePaths) -> String {
    paths.log_path.display().to_string()
}
