//! Framed JSON-RPC transport over a language server's stdio (C2).
//!
//! One [`LspTransport`] owns one child process's stdin/stdout. Writes go
//! through a single-writer mutex so frames are never interleaved. A single
//! reader task owns stdout and demultiplexes responses (by id), server-
//! initiated requests (answered with a minimal valid result), and
//! notifications (broadcast to subscribers, with `publishDiagnostics`
//! additionally cached by URI).

use crate::error::LspcError;
use crate::protocol::{self, Message, Notification, Request, RequestId, Response, ResponseError};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::{debug, warn};

/// Outcome delivered to a request's waiter.
pub type RequestOutcome = Result<Value, LspcError>;

/// Events fanned out to anyone subscribed on this instance's transport.
#[derive(Debug, Clone)]
pub enum LspEvent {
    /// A notification the server sent, verbatim method + params.
    Notification { method: String, params: Value },
    /// The reader loop hit EOF or a framing error; the process is dead.
    Exited,
}

struct PendingSlot {
    tx: oneshot::Sender<RequestOutcome>,
}

type Writer = Box<dyn AsyncWrite + Unpin + Send>;

pub struct LspTransport {
    /// Kept alive so the child is reaped on drop; `None` in unit tests that
    /// drive the transport over an in-memory pipe instead of a real process.
    child: Mutex<Option<Child>>,
    writer: Arc<Mutex<Writer>>,
    next_id: AtomicI64,
    pending: Arc<Mutex<HashMap<i64, PendingSlot>>>,
    events: broadcast::Sender<LspEvent>,
    /// Latest diagnostics per document URI, keyed further by the document
    /// version they were published for.
    diagnostics: Arc<Mutex<HashMap<String, Vec<(i64, Vec<protocol::Diagnostic>)>>>>,
    alive: Arc<AtomicBool>,
}

impl LspTransport {
    /// Spawn `command` with `workspace_root` as its current directory and
    /// wire up stdio framing.
    pub fn spawn(command: &[String], workspace_root: &Path) -> Result<Self, LspcError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| LspcError::ServerSpawnFailed("empty command".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspcError::ServerSpawnFailed(format!("{program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspcError::ServerSpawnFailed("no stdin handle".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspcError::ServerSpawnFailed("no stdout handle".into()))?;

        Ok(Self::from_io(Box::new(stdin), stdout, Some(child)))
    }

    /// Build a transport over arbitrary async reader/writer halves — used
    /// both by `spawn` and directly by tests against an in-memory pipe.
    pub fn from_io(
        writer: Writer,
        reader: impl AsyncRead + Unpin + Send + 'static,
        child: Option<Child>,
    ) -> Self {
        let writer = Arc::new(Mutex::new(writer));
        let pending: Arc<Mutex<HashMap<i64, PendingSlot>>> = Arc::new(Mutex::new(HashMap::new()));
        let (events, _rx) = broadcast::channel(256);
        let diagnostics = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(reader_loop(
            BufReader::new(reader),
            Arc::clone(&writer),
            Arc::clone(&pending),
            events.clone(),
            Arc::clone(&diagnostics),
            Arc::clone(&alive),
        ));

        Self {
            child: Mutex::new(child),
            writer,
            next_id: AtomicI64::new(1),
            pending,
            events,
            diagnostics,
            alive,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// OS process id of the child, if this transport was built with one
    /// (it isn't, in tests that drive an in-memory pipe directly).
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(|c| c.id())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LspEvent> {
        self.events.subscribe()
    }

    /// Send a request and return a receiver for the eventual outcome.
    ///
    /// The pending-request entry is inserted *before* the bytes are
    /// flushed, per the invariant in spec §3 — a fast response can never
    /// race ahead of its own bookkeeping.
    pub async fn send_request(
        &self,
        method: &str,
        params: Value,
    ) -> Result<oneshot::Receiver<RequestOutcome>, LspcError> {
        if !self.is_alive() {
            return Err(LspcError::ServerExited);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, PendingSlot { tx });

        let req = Request::new(id, method, params);
        if let Err(e) = write_message(&self.writer, &serde_json::to_value(&req).unwrap()).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }
        Ok(rx)
    }

    /// Best-effort `$/cancelRequest` for a timed-out request (spec §5).
    pub async fn cancel(&self, id: i64) {
        let _ = write_message(
            &self.writer,
            &serde_json::to_value(Notification::new(
                "$/cancelRequest",
                serde_json::json!({ "id": id }),
            ))
            .unwrap(),
        )
        .await;
    }

    pub async fn notify(&self, method: &str, params: Value) -> Result<(), LspcError> {
        if !self.is_alive() {
            return Err(LspcError::ServerExited);
        }
        write_message(
            &self.writer,
            &serde_json::to_value(Notification::new(method, params)).unwrap(),
        )
        .await
    }

    /// Latest diagnostics cached for `uri` at exactly `version`, if any.
    pub async fn cached_diagnostics(
        &self,
        uri: &str,
        version: i64,
    ) -> Option<Vec<protocol::Diagnostic>> {
        let cache = self.diagnostics.lock().await;
        cache
            .get(uri)
            .and_then(|versions| versions.iter().find(|(v, _)| *v == version))
            .map(|(_, diags)| diags.clone())
    }

    /// Send `shutdown` then `exit`, waiting up to `grace` for the process
    /// to exit before escalating to SIGTERM/SIGKILL.
    pub async fn shutdown(&self, grace: std::time::Duration) {
        if self.is_alive() {
            if let Ok(rx) = self.send_request("shutdown", Value::Null).await {
                let _ = tokio::time::timeout(grace, rx).await;
            }
            let _ = self.notify("exit", Value::Null).await;
        }

        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    terminate(child);
                    let _ = tokio::time::timeout(grace, child.wait()).await;
                    let _ = child.start_kill();
                }
            }
        }
        self.alive.store(false, Ordering::SeqCst);
        fail_all_pending(&self.pending, LspcError::ServerExited).await;
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

async fn fail_all_pending(pending: &Arc<Mutex<HashMap<i64, PendingSlot>>>, err_factory: LspcError) {
    let mut map = pending.lock().await;
    for (_, slot) in map.drain() {
        let err = match &err_factory {
            LspcError::ServerExited => LspcError::ServerExited,
            other => LspcError::ProtocolError(other.to_string()),
        };
        let _ = slot.tx.send(Err(err));
    }
}

/// Write one LSP frame: `Content-Length: N\r\n\r\n` followed by the JSON body.
async fn write_message(writer: &Arc<Mutex<Writer>>, value: &Value) -> Result<(), LspcError> {
    let body = serde_json::to_vec(value).map_err(|e| LspcError::ProtocolError(e.to_string()))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());

    let mut w = writer.lock().await;
    w.write_all(header.as_bytes()).await?;
    w.write_all(&body).await?;
    w.flush().await?;
    Ok(())
}

/// Read one LSP frame: parse headers until a blank line, then read exactly
/// `Content-Length` body bytes. Never scans for newlines inside the body,
/// so multi-hundred-diagnostic payloads in a single frame are handled.
async fn read_message<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<Vec<u8>, LspcError> {
    use tokio::io::AsyncBufReadExt;

    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(LspcError::IoError)?;
        if n == 0 {
            return Err(LspcError::ServerExited);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed.strip_prefix("Content-Length: ") {
            content_length = Some(
                value
                    .trim()
                    .parse()
                    .map_err(|_| LspcError::ProtocolError("bad Content-Length".into()))?,
            );
        }
        // Other headers (e.g. Content-Type) are accepted and ignored.
    }

    let length =
        content_length.ok_or_else(|| LspcError::ProtocolError("missing Content-Length".into()))?;
    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .map_err(LspcError::IoError)?;
    Ok(body)
}

async fn reader_loop<R: AsyncRead + Unpin>(
    mut reader: BufReader<R>,
    writer: Arc<Mutex<Writer>>,
    pending: Arc<Mutex<HashMap<i64, PendingSlot>>>,
    events: broadcast::Sender<LspEvent>,
    diagnostics: Arc<Mutex<HashMap<String, Vec<(i64, Vec<protocol::Diagnostic>)>>>>,
    alive: Arc<AtomicBool>,
) {
    loop {
        let body = match read_message(&mut reader).await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "lsp transport read failed, marking instance exited");
                alive.store(false, Ordering::SeqCst);
                fail_all_pending(&pending, LspcError::ServerExited).await;
                let _ = events.send(LspEvent::Exited);
                return;
            }
        };

        let message = match protocol::parse_message(&body) {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "failed to parse lsp message body, skipping");
                continue;
            }
        };

        match message {
            Message::Response(resp) => {
                let id = match resp.id {
                    RequestId::Number(n) => n,
                    RequestId::String(_) => continue,
                };
                let slot = pending.lock().await.remove(&id);
                if let Some(slot) = slot {
                    let outcome = if let Some(err) = resp.error {
                        Err(LspcError::ProtocolError(format!(
                            "{} ({})",
                            err.message, err.code
                        )))
                    } else {
                        Ok(resp.result.unwrap_or(Value::Null))
                    };
                    let _ = slot.tx.send(outcome);
                }
            }
            Message::Request(req) => {
                respond_to_server_request(&writer, req).await;
            }
            Message::Notification(notif) => {
                if notif.method == "textDocument/publishDiagnostics" {
                    if let Some(params) = &notif.params {
                        cache_diagnostics(&diagnostics, params).await;
                    }
                }
                let _ = events.send(LspEvent::Notification {
                    method: notif.method,
                    params: notif.params.unwrap_or(Value::Null),
                });
            }
        }
    }
}

async fn cache_diagnostics(
    diagnostics: &Arc<Mutex<HashMap<String, Vec<(i64, Vec<protocol::Diagnostic>)>>>>,
    params: &Value,
) {
    let Some(uri) = params.get("uri").and_then(|u| u.as_str()) else {
        return;
    };
    let version = params.get("version").and_then(|v| v.as_i64()).unwrap_or(0);
    let mut items = protocol::parse_diagnostics(params);
    protocol::sort_diagnostics(&mut items);

    let mut cache = diagnostics.lock().await;
    let versions = cache.entry(uri.to_string()).or_default();
    versions.retain(|(v, _)| *v != version);
    versions.push((version, items));
    // Keep only the most recent few versions per URI to bound memory.
    if versions.len() > 4 {
        versions.remove(0);
    }
}

/// Answer a server-initiated request with a minimal valid result, or
/// method-not-found for anything we don't recognize.
async fn respond_to_server_request(writer: &Arc<Mutex<Writer>>, req: Request) {
    let result = match req.method.as_str() {
        "workspace/configuration" => {
            let count = req
                .params
                .as_ref()
                .and_then(|p| p.get("items"))
                .and_then(|i| i.as_array())
                .map(|a| a.len())
                .unwrap_or(1);
            Some(Value::Array(vec![Value::Null; count]))
        }
        "window/workDoneProgress/create" => Some(Value::Null),
        "client/registerCapability" | "client/unregisterCapability" => Some(Value::Null),
        _ => None,
    };

    let response = match result {
        Some(value) => Response::success(req.id, value),
        None => Response::error(
            req.id,
            ResponseError {
                code: protocol::error_codes::METHOD_NOT_FOUND,
                message: format!("method not found: {}", req.method),
                data: None,
            },
        ),
    };

    let _ = write_message(writer, &serde_json::to_value(&response).unwrap()).await;
}
