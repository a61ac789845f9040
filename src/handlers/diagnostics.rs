//! `diagnostics <file>` handler (spec §4.5).

use crate::error::LspcError;
use crate::lsp::LspEvent;
use crate::protocol::{self, Diagnostic};
use crate::registry::DiagnosticsReadyPredicate;
use crate::session::{ServerInstance, SessionManager};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub struct DiagnosticsOutcome {
    pub lines: Vec<String>,
    pub has_issues: bool,
}

/// Ensure a server, open the file, wait for its diagnostics, close it.
/// `NoDescriptor` is not an error here — it resolves to an empty, clean
/// result (spec §7).
pub async fn diagnostics(
    session: &SessionManager,
    file: &Path,
    timeout: Duration,
) -> Result<DiagnosticsOutcome, LspcError> {
    let instance = match session.ensure_server(file).await {
        Ok(instance) => instance,
        Err(LspcError::NoDescriptor(_)) => {
            return Ok(DiagnosticsOutcome {
                lines: Vec::new(),
                has_issues: false,
            })
        }
        Err(e) => return Err(e),
    };

    // Subscribe before didOpen — a fast server's first publishDiagnostics
    // must never race ahead of this subscription (spec §5).
    let mut events = instance
        .subscribe_events()
        .await
        .ok_or(LspcError::ServerExited)?;
    let doc = instance.open_document(file).await?;

    let result = wait_for_diagnostics(&instance, &mut events, &doc.uri, doc.version, timeout).await;

    instance.close_document(&doc).await;

    let mut diags = result?;
    protocol::sort_diagnostics(&mut diags);
    let lines: Vec<String> = diags.iter().map(Diagnostic::format_line).collect();
    let has_issues = !lines.is_empty();
    Ok(DiagnosticsOutcome { lines, has_issues })
}

async fn wait_for_diagnostics(
    instance: &Arc<ServerInstance>,
    events: &mut broadcast::Receiver<LspEvent>,
    uri: &str,
    version: i64,
    deadline: Duration,
) -> Result<Vec<Diagnostic>, LspcError> {
    if let DiagnosticsReadyPredicate::PullDiagnostics = instance.descriptor.diagnostics_ready {
        return pull_diagnostics(instance, uri, deadline).await;
    }

    let quiescence = match instance.descriptor.diagnostics_ready {
        DiagnosticsReadyPredicate::QuiescenceWindow(d) => Some(d),
        _ => None,
    };

    let start = Instant::now();
    let mut latest: Option<Vec<Diagnostic>> = None;

    loop {
        let remaining = deadline.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Ok(latest.unwrap_or_default());
        }

        let wait_for = match (quiescence, &latest) {
            // Once we have a first batch, only wait out the quiescence
            // window for a follow-up before declaring this one final.
            (Some(q), Some(_)) => remaining.min(q),
            _ => remaining,
        };

        match tokio::time::timeout(wait_for, events.recv()).await {
            Ok(Ok(LspEvent::Notification { method, params })) => {
                if method != "textDocument/publishDiagnostics" {
                    continue;
                }
                let matches_uri = params.get("uri").and_then(|u| u.as_str()) == Some(uri);
                let matches_version = params
                    .get("version")
                    .and_then(|v| v.as_i64())
                    .map(|v| v == version)
                    .unwrap_or(true);
                if !matches_uri || !matches_version {
                    continue;
                }
                let mut diags = protocol::parse_diagnostics(&params);
                protocol::sort_diagnostics(&mut diags);
                latest = Some(diags);
                if quiescence.is_none() {
                    return Ok(latest.unwrap());
                }
                // Quiescence predicate: keep looping, resetting the window.
            }
            Ok(Ok(LspEvent::Exited)) => return Err(LspcError::ServerExited),
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => return Err(LspcError::ServerExited),
            Err(_elapsed) => {
                if latest.is_some() {
                    return Ok(latest.unwrap());
                }
                // No batch arrived at all within the overall deadline.
                return Ok(Vec::new());
            }
        }
    }
}

async fn pull_diagnostics(
    instance: &Arc<ServerInstance>,
    uri: &str,
    deadline: Duration,
) -> Result<Vec<Diagnostic>, LspcError> {
    let result = tokio::time::timeout(
        deadline,
        instance.send_request("textDocument/diagnostic", json!({ "textDocument": { "uri": uri } })),
    )
    .await
    .map_err(|_| LspcError::Timeout)??;

    let items = result.get("items").cloned().unwrap_or_else(|| json!([]));
    let mut diags = protocol::parse_diagnostics(&json!({ "diagnostics": items }));
    protocol::sort_diagnostics(&mut diags);
    Ok(diags)
}
