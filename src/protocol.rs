//! JSON-RPC 2.0 message types exchanged with a language server over stdio.
//!
//! LSP messages are unschematised at the boundary: we parse the envelope
//! into a tagged `Message` enum and keep `params`/`result` as opaque JSON,
//! decoding the known shapes (`publishDiagnostics`, `documentSymbol`,
//! `hover`) only where a handler actually needs them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request/response id. LSP servers may echo either shape back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: i64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(id),
            method: method.into(),
            params: Some(params),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: RequestId, error: ResponseError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[allow(dead_code)]
pub mod error_codes {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Some(params),
        }
    }
}

/// A parsed JSON-RPC message, classified by the presence of `id`/`result`/
/// `error` fields — LSP has no explicit type tag on the wire.
#[derive(Debug, Clone)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

/// Classify and parse one JSON-RPC body.
///
/// A message with `result` or `error` is a response; one with an `id` but
/// neither is a server-initiated request; anything else is a notification.
pub fn parse_message(body: &[u8]) -> serde_json::Result<Message> {
    let value: Value = serde_json::from_slice(body)?;

    if value.get("result").is_some() || value.get("error").is_some() {
        Ok(Message::Response(serde_json::from_value(value)?))
    } else if value.get("id").is_some() {
        Ok(Message::Request(serde_json::from_value(value)?))
    } else {
        Ok(Message::Notification(serde_json::from_value(value)?))
    }
}

// ─── Diagnostics ──────────────────────────────────────────────────────────

/// Severity levels matching LSP `DiagnosticSeverity` (1-based in the spec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Error = 0,
    Warning = 1,
    Information = 2,
    Hint = 3,
}

impl Severity {
    pub fn from_lsp_int(n: u64) -> Self {
        match n {
            1 => Severity::Error,
            2 => Severity::Warning,
            3 => Severity::Information,
            4 => Severity::Hint,
            _ => Severity::Information,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Information => "INFO",
            Severity::Hint => "HINT",
        }
    }
}

/// One finding from a `textDocument/publishDiagnostics` notification,
/// already projected into the shape the `diagnostics` handler formats.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub source: String,
    pub message: String,
    pub code: String,
}

impl Diagnostic {
    /// Render as the one-line wire format from spec §6:
    /// `[<source>] <SEVERITY> at line <L>, column <C>: <message> [<code>]`
    pub fn format_line(&self) -> String {
        format!(
            "[{}] {} at line {}, column {}: {} [{}]",
            self.source,
            self.severity.label(),
            self.line,
            self.column,
            self.message,
            self.code
        )
    }
}

/// Parse the `diagnostics` array of a `publishDiagnostics` notification into
/// 1-based `Diagnostic`s ready for formatting.
pub fn parse_diagnostics(params: &Value) -> Vec<Diagnostic> {
    let Some(items) = params.get("diagnostics").and_then(|d| d.as_array()) else {
        return Vec::new();
    };
    let default_source = params
        .get("source")
        .and_then(|s| s.as_str())
        .unwrap_or("lsp");

    items
        .iter()
        .filter_map(|d| {
            let range = d.get("range")?;
            let start = range.get("start")?;
            let line = start.get("line")?.as_u64()? as u32 + 1;
            let column = start.get("character")?.as_u64()? as u32 + 1;
            let severity = d
                .get("severity")
                .and_then(|s| s.as_u64())
                .map(Severity::from_lsp_int)
                .unwrap_or(Severity::Information);
            let message = d.get("message")?.as_str()?.to_string();
            let source = d
                .get("source")
                .and_then(|s| s.as_str())
                .unwrap_or(default_source)
                .to_string();
            let code = d
                .get("code")
                .map(|c| match c {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            Some(Diagnostic {
                line,
                column,
                severity,
                source,
                message,
                code,
            })
        })
        .collect()
}

/// Sort diagnostics by `(line, column, severity rank, source)`, per spec §4.5.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        (a.line, a.column, a.severity, &a.source).cmp(&(b.line, b.column, b.severity, &b.source))
    });
}
