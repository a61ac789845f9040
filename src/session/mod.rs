//! LSP session manager (C4): lifecycle of language server subprocesses,
//! lookup by (workspace root, language), and the initialize/shutdown
//! handshake.

use crate::error::LspcError;
use crate::lsp::{LspEvent, LspTransport};
use crate::paths::find_project_root;
use crate::registry::{Registry, ServerDescriptor};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tracing::{info, warn};

const T_SHUTDOWN: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Starting,
    Initializing,
    Ready,
    ShuttingDown,
    Exited,
}

/// A file opened against an instance for the duration of one request.
/// Transient by design — see spec §3: the server need not hold editor
/// state across requests.
#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub uri: String,
    pub version: i64,
}

/// A live (workspace root, descriptor) pair: subprocess + bookkeeping.
pub struct ServerInstance {
    pub descriptor: ServerDescriptor,
    pub workspace_root: PathBuf,
    pid: AtomicU32,
    transport: RwLock<Option<LspTransport>>,
    state: RwLock<InstanceState>,
    ready_notify: Notify,
    open_documents: Mutex<HashMap<String, OpenDocument>>,
    next_doc_version: AtomicI64,
    last_activity: Mutex<Instant>,
}

impl ServerInstance {
    fn placeholder(descriptor: ServerDescriptor, workspace_root: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            workspace_root,
            pid: AtomicU32::new(0),
            transport: RwLock::new(None),
            state: RwLock::new(InstanceState::Starting),
            ready_notify: Notify::new(),
            open_documents: Mutex::new(HashMap::new()),
            next_doc_version: AtomicI64::new(1),
            last_activity: Mutex::new(Instant::now()),
        })
    }

    pub async fn state(&self) -> InstanceState {
        *self.state.read().await
    }

    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    async fn set_state(&self, state: InstanceState) {
        *self.state.write().await = state;
        self.ready_notify.notify_waiters();
    }

    /// Wait for this instance to reach `Ready`, or fail if it dies while
    /// initializing. Used by a second caller that observed this instance
    /// already spawning when it called `ensure_server`.
    pub async fn wait_ready(&self) -> Result<(), LspcError> {
        loop {
            let notified = self.ready_notify.notified();
            let state = self.state().await;
            match state {
                InstanceState::Ready => return Ok(()),
                InstanceState::Exited => {
                    return Err(LspcError::ServerInitFailed(
                        "language server exited during initialization".into(),
                    ))
                }
                _ => {}
            }
            notified.await;
        }
    }

    async fn run_initialize_handshake(&self) -> Result<(), LspcError> {
        let transport = LspTransport::spawn(&self.descriptor.command, &self.workspace_root)?;
        if let Some(pid) = transport.pid().await {
            self.pid.store(pid, Ordering::SeqCst);
        }

        let workspace_uri = format!("file://{}", self.workspace_root.display());
        let init_params = json!({
            "processId": std::process::id(),
            "rootUri": workspace_uri,
            "capabilities": {
                "textDocument": {
                    "synchronization": { "dynamicRegistration": false },
                    "publishDiagnostics": { "relatedInformation": false },
                    "hover": { "contentFormat": ["plaintext", "markdown"] },
                    "documentSymbol": { "hierarchicalDocumentSymbolSupport": true }
                },
                "workspace": { "workspaceFolders": true }
            },
            "workspaceFolders": [{
                "uri": workspace_uri,
                "name": self.workspace_root.file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            }],
            "initializationOptions": self.descriptor.init_options,
        });

        self.set_state(InstanceState::Initializing).await;

        let rx = transport.send_request("initialize", init_params).await?;
        rx.await
            .map_err(|_| LspcError::ServerInitFailed("initialize channel closed".into()))?
            .map_err(|e| LspcError::ServerInitFailed(e.to_string()))?;

        transport
            .notify("initialized", json!({}))
            .await
            .map_err(|e| LspcError::ServerInitFailed(e.to_string()))?;

        *self.transport.write().await = Some(transport);
        self.set_state(InstanceState::Ready).await;
        Ok(())
    }

    pub async fn is_alive(&self) -> bool {
        match self.transport.read().await.as_ref() {
            Some(t) => t.is_alive(),
            None => false,
        }
    }

    pub async fn subscribe_events(&self) -> Option<broadcast::Receiver<LspEvent>> {
        self.transport.read().await.as_ref().map(|t| t.subscribe())
    }

    pub async fn cached_diagnostics(
        &self,
        uri: &str,
        version: i64,
    ) -> Option<Vec<crate::protocol::Diagnostic>> {
        let guard = self.transport.read().await;
        let t = guard.as_ref()?;
        t.cached_diagnostics(uri, version).await
    }

    /// Open `file` against this instance: read its contents, assign a fresh
    /// version, and send `textDocument/didOpen`.
    pub async fn open_document(&self, file: &Path) -> Result<OpenDocument, LspcError> {
        let content = tokio::fs::read_to_string(file).await.map_err(LspcError::IoError)?;
        let uri = format!("file://{}", file.display());
        let version = self.next_doc_version.fetch_add(1, Ordering::SeqCst);

        let guard = self.transport.read().await;
        let transport = guard.as_ref().ok_or(LspcError::ServerExited)?;
        transport
            .notify(
                "textDocument/didOpen",
                json!({
                    "textDocument": {
                        "uri": uri,
                        "languageId": self.descriptor.language_id,
                        "version": version,
                        "text": content
                    }
                }),
            )
            .await?;
        drop(guard);

        let doc = OpenDocument {
            uri: uri.clone(),
            version,
        };
        self.open_documents.lock().await.insert(uri, doc.clone());
        *self.last_activity.lock().await = Instant::now();
        Ok(doc)
    }

    /// Close `doc`. Idempotent — closing twice (or a doc never tracked) is
    /// a no-op beyond the best-effort `didClose` notification.
    pub async fn close_document(&self, doc: &OpenDocument) {
        self.open_documents.lock().await.remove(&doc.uri);
        if let Some(transport) = self.transport.read().await.as_ref() {
            let _ = transport
                .notify(
                    "textDocument/didClose",
                    json!({ "textDocument": { "uri": doc.uri } }),
                )
                .await;
        }
    }

    pub async fn open_document_count(&self) -> usize {
        self.open_documents.lock().await.len()
    }

    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value, LspcError> {
        let guard = self.transport.read().await;
        let transport = guard.as_ref().ok_or(LspcError::ServerExited)?;
        let rx = transport.send_request(method, params).await?;
        drop(guard);
        rx.await.map_err(|_| LspcError::ServerExited)?
    }

    pub async fn shutdown(&self) {
        self.set_state(InstanceState::ShuttingDown).await;
        if let Some(transport) = self.transport.read().await.as_ref() {
            transport.shutdown(T_SHUTDOWN).await;
        }
        self.set_state(InstanceState::Exited).await;
    }
}

impl Clone for OpenDocument {
    fn clone(&self) -> Self {
        Self {
            uri: self.uri.clone(),
            version: self.version,
        }
    }
}

/// Summary row for `status`/`list`-style introspection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstanceSummary {
    pub descriptor_id: String,
    pub language_id: String,
    pub workspace_root: String,
    pub state: String,
    pub pid: Option<u32>,
    pub open_documents: usize,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceState::Starting => "starting",
            InstanceState::Initializing => "initializing",
            InstanceState::Ready => "ready",
            InstanceState::ShuttingDown => "shutting_down",
            InstanceState::Exited => "exited",
        };
        f.write_str(s)
    }
}

type InstanceKey = (PathBuf, String);

/// Owns every `ServerInstance` for this daemon. At most one non-`Exited`
/// instance per (workspace root, descriptor id) — spec §3's core invariant.
pub struct SessionManager {
    registry: Registry,
    instances: RwLock<HashMap<InstanceKey, Arc<ServerInstance>>>,
}

impl SessionManager {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolve the descriptor for `file_path`'s extension and return a
    /// `Ready` instance for it, spawning one if necessary.
    pub async fn ensure_server(&self, file_path: &Path) -> Result<Arc<ServerInstance>, LspcError> {
        let ext = file_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let descriptor = self
            .registry
            .by_extension(&ext)
            .cloned()
            .ok_or_else(|| LspcError::NoDescriptor(ext.clone()))?;

        let root = find_project_root(file_path, &descriptor.root_markers);
        let key: InstanceKey = (root.clone(), descriptor.id.clone());

        // Fast path: a healthy instance already exists.
        if let Some(existing) = self.instances.read().await.get(&key).cloned() {
            match existing.state().await {
                InstanceState::Ready => return Ok(existing),
                InstanceState::Starting | InstanceState::Initializing => {
                    existing.wait_ready().await?;
                    return Ok(existing);
                }
                InstanceState::Exited | InstanceState::ShuttingDown => {}
            }
        }

        // Slow path: insert a placeholder under the write lock so a second
        // concurrent caller sees "Starting" instead of racing to spawn a
        // duplicate process for the same (root, descriptor) pair.
        let instance = {
            let mut map = self.instances.write().await;
            if let Some(existing) = map.get(&key).cloned() {
                if matches!(existing.state().await, InstanceState::Starting | InstanceState::Initializing | InstanceState::Ready) {
                    drop(map);
                    existing.wait_ready().await?;
                    return Ok(existing);
                }
            }
            let placeholder = ServerInstance::placeholder(descriptor, root);
            map.insert(key.clone(), Arc::clone(&placeholder));
            placeholder
        };

        // Spawning blocks this caller only — the map lock is released above
        // so other (root, descriptor) pairs are unaffected (spec §5).
        match instance.run_initialize_handshake().await {
            Ok(()) => {
                info!(
                    descriptor = %instance.descriptor.id,
                    root = %instance.workspace_root.display(),
                    "language server ready"
                );
                Ok(instance)
            }
            Err(e) => {
                warn!(error = %e, "language server failed to initialize");
                instance.set_state(InstanceState::Exited).await;
                self.instances.write().await.remove(&key);
                Err(e)
            }
        }
    }

    pub async fn list_instances(&self) -> Vec<InstanceSummary> {
        let map = self.instances.read().await;
        let mut summaries = Vec::with_capacity(map.len());
        for instance in map.values() {
            summaries.push(InstanceSummary {
                descriptor_id: instance.descriptor.id.clone(),
                language_id: instance.descriptor.language_id.clone(),
                workspace_root: instance.workspace_root.display().to_string(),
                state: instance.state().await.to_string(),
                pid: instance.pid(),
                open_documents: instance.open_document_count().await,
            });
        }
        summaries
    }

    pub async fn active_language_ids(&self) -> Vec<String> {
        let map = self.instances.read().await;
        let mut ids = Vec::new();
        for instance in map.values() {
            if instance.state().await == InstanceState::Ready {
                ids.push(instance.descriptor.language_id.clone());
            }
        }
        ids.sort();
        ids.dedup();
        ids
    }

    /// `true` if no instance has any open documents — used by the idle
    /// shutdown check (spec §4.6).
    pub async fn all_documents_closed(&self) -> bool {
        let map = self.instances.read().await;
        for instance in map.values() {
            if instance.open_document_count().await > 0 {
                return false;
            }
        }
        true
    }

    /// Shut down every tracked instance. Used at daemon shutdown (idle or
    /// explicit `stop`).
    pub async fn shutdown_all(&self) {
        let instances: Vec<Arc<ServerInstance>> =
            self.instances.read().await.values().cloned().collect();
        for instance in instances {
            instance.shutdown().await;
        }
        self.instances.write().await.clear();
    }
}
