//! Request handlers (C5) and the socket request/response envelope they're
//! dispatched through by the daemon's connection loop (C6).

pub mod diagnostics;
pub mod hover;
pub mod lifecycle;
pub mod status;

use crate::paths::WorkspacePaths;
use crate::session::SessionManager;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One request read off the client socket: `{ command, args, configFile? }`
/// (spec §6). `config_file` is forwarded opaquely — the core never parses it.
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, rename = "configFile")]
    pub config_file: Option<String>,
}

/// One response written back: `{ success, result?, error? }` (spec §6).
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// Shared state every dispatched request needs. One per daemon process.
pub struct DaemonContext {
    pub session: Arc<SessionManager>,
    pub paths: WorkspacePaths,
    pub started_at: Instant,
    pub diagnostics_timeout: Duration,
    pub hover_timeout: Duration,
    /// Notified once, by the `stop` handler, to tell the accept loop to
    /// unwind after this connection finishes writing its response.
    pub shutdown: Arc<tokio::sync::Notify>,
}

/// Dispatch one request to the matching handler, translating every outcome
/// into a `DaemonResponse` — handler-level failures never tear down the
/// daemon (spec §7).
pub async fn dispatch(ctx: &DaemonContext, req: DaemonRequest) -> DaemonResponse {
    match req.command.as_str() {
        "diagnostics" => dispatch_diagnostics(ctx, &req).await,
        "hover" => dispatch_hover(ctx, &req).await,
        "status" => {
            let snapshot = status::status(&ctx.session, &ctx.paths.workspace, ctx.started_at).await;
            match serde_json::to_value(snapshot) {
                Ok(v) => DaemonResponse::ok(v),
                Err(e) => DaemonResponse::err(e.to_string()),
            }
        }
        "statusline" => {
            let line = status::statusline(&ctx.session).await;
            DaemonResponse::ok(Value::String(line))
        }
        "stop" => {
            lifecycle::stop(&ctx.session).await;
            ctx.shutdown.notify_one();
            DaemonResponse::ok(Value::Bool(true))
        }
        "logs" => DaemonResponse::ok(Value::String(lifecycle::logs(&ctx.paths))),
        other => DaemonResponse::err(format!("unknown command: {other}")),
    }
}

async fn dispatch_diagnostics(ctx: &DaemonContext, req: &DaemonRequest) -> DaemonResponse {
    let Some(file) = req.args.first() else {
        return DaemonResponse::err("diagnostics requires a file argument");
    };
    match diagnostics::diagnostics(&ctx.session, &PathBuf::from(file), ctx.diagnostics_timeout).await {
        Ok(outcome) => DaemonResponse::ok(serde_json::json!({
            "lines": outcome.lines,
            "hasIssues": outcome.has_issues,
        })),
        Err(e) => DaemonResponse::err(e.to_string()),
    }
}

async fn dispatch_hover(ctx: &DaemonContext, req: &DaemonRequest) -> DaemonResponse {
    let (Some(file), Some(symbol)) = (req.args.first(), req.args.get(1)) else {
        return DaemonResponse::err("hover requires a file and a symbol argument");
    };
    match hover::hover(&ctx.session, &PathBuf::from(file), symbol, ctx.hover_timeout).await {
        Ok(text) => DaemonResponse::ok(Value::String(text)),
        Err(e) => DaemonResponse::err(e.to_string()),
    }
}

/// Exit code a short-lived client should use for a finished request, per
/// spec §7: `diagnostics` signals findings with 2, everything else is 0 on
/// success / 1 on `{success:false}`.
pub fn exit_code_for(command: &str, response: &DaemonResponse) -> i32 {
    if !response.success {
        return 1;
    }
    if command == "diagnostics" {
        let has_issues = response
            .result
            .as_ref()
            .and_then(|r| r.get("hasIssues"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if has_issues {
            return 2;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_for_diagnostics_with_issues_is_2() {
        let resp = DaemonResponse::ok(serde_json::json!({"lines": ["x"], "hasIssues": true}));
        assert_eq!(exit_code_for("diagnostics", &resp), 2);
    }

    #[test]
    fn exit_code_for_clean_diagnostics_is_0() {
        let resp = DaemonResponse::ok(serde_json::json!({"lines": [], "hasIssues": false}));
        assert_eq!(exit_code_for("diagnostics", &resp), 0);
    }

    #[test]
    fn exit_code_for_failure_is_1() {
        let resp = DaemonResponse::err("boom");
        assert_eq!(exit_code_for("diagnostics", &resp), 1);
        assert_eq!(exit_code_for("status", &resp), 1);
    }
}
