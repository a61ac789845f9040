//! Daemon server (C6): socket listener, per-connection request/response
//! loop, idle shutdown.

use crate::config::DaemonConfig;
use crate::handlers::{self, DaemonContext, DaemonRequest, DaemonResponse};
use crate::paths::WorkspacePaths;
use crate::registry::Registry;
use crate::registry_dir::{self, DaemonRecord};
use crate::session::SessionManager;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Run the daemon for `paths.workspace` until it shuts down (idle timeout or
/// an explicit `stop` command). Never returns an error on a clean shutdown —
/// only propagates failure to bind the socket in the first place.
pub async fn run(paths: WorkspacePaths, config: DaemonConfig) -> crate::error::Result<()> {
    if let Some(parent) = paths.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = match bind(&paths.socket_path).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(error = %e, "daemon for this workspace appears to be running already");
            return Err(e);
        }
    };

    let registry = Registry::new(config.servers.clone());
    let session = Arc::new(SessionManager::new(registry));
    let shutdown = Arc::new(Notify::new());
    let last_activity = Arc::new(AtomicAsSecs::new());
    last_activity.touch();

    let record = DaemonRecord::new(&paths.workspace, std::process::id(), &paths.socket_path);
    if let Err(e) = registry_dir::register(&crate::paths::state_dir(), &paths.hash, &record) {
        warn!(error = %e, "failed to write cross-daemon registry entry");
    }

    let ctx = Arc::new(DaemonContext {
        session: Arc::clone(&session),
        paths: paths.clone(),
        started_at: Instant::now(),
        diagnostics_timeout: Duration::from_millis(config.diagnostics_timeout_ms),
        hover_timeout: Duration::from_millis(config.diagnostics_timeout_ms),
        shutdown: Arc::clone(&shutdown),
    });

    info!(socket = %paths.socket_path.display(), "daemon listening");

    let idle_handle = tokio::spawn(idle_shutdown_loop(
        Arc::clone(&session),
        Arc::clone(&shutdown),
        Arc::clone(&last_activity),
        Duration::from_secs(config.idle_timeout_secs),
    ));

    accept_loop(listener, ctx, Arc::clone(&shutdown), Arc::clone(&last_activity)).await;

    idle_handle.abort();
    session.shutdown_all().await;
    let _ = std::fs::remove_file(&paths.socket_path);
    registry_dir::unregister(&crate::paths::state_dir(), &paths.hash);
    info!("daemon shut down");
    Ok(())
}

async fn bind(socket_path: &std::path::Path) -> crate::error::Result<UnixListener> {
    match UnixListener::bind(socket_path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            // Probe: is a daemon actually alive at this path, or is this a
            // stale socket file left behind by a crash?
            if UnixStream::connect(socket_path).await.is_ok() {
                Err(crate::error::LspcError::IoError(e))
            } else {
                std::fs::remove_file(socket_path)?;
                UnixListener::bind(socket_path).map_err(crate::error::LspcError::IoError)
            }
        }
        Err(e) => Err(crate::error::LspcError::IoError(e)),
    }
}

async fn accept_loop(
    listener: UnixListener,
    ctx: Arc<DaemonContext>,
    shutdown: Arc<Notify>,
    last_activity: Arc<AtomicAsSecs>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                debug!("shutdown requested, unwinding accept loop");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        last_activity.touch();
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &ctx).await {
                                error!(error = %e, "connection handling failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

/// Read one JSON request until EOF, dispatch, write one JSON response, close.
/// Both directions buffer to EOF rather than assuming a framing boundary, so
/// a response with hundreds of diagnostics round-trips correctly.
async fn handle_connection(mut stream: UnixStream, ctx: &DaemonContext) -> std::io::Result<()> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;

    let response = match serde_json::from_slice::<DaemonRequest>(&buf) {
        Ok(req) => handlers::dispatch(ctx, req).await,
        Err(e) => DaemonResponse::err(format!("invalid request: {e}")),
    };

    let body = serde_json::to_vec(&response).unwrap_or_else(|_| b"{\"success\":false}".to_vec());
    stream.write_all(&body).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn idle_shutdown_loop(
    session: Arc<SessionManager>,
    shutdown: Arc<Notify>,
    last_activity: Arc<AtomicAsSecs>,
    idle_timeout: Duration,
) {
    let mut ticker = tokio::time::interval(IDLE_CHECK_INTERVAL);
    loop {
        ticker.tick().await;
        if last_activity.elapsed() >= idle_timeout && session.all_documents_closed().await {
            info!("idle timeout reached with no open documents, shutting down");
            shutdown.notify_one();
            return;
        }
    }
}

/// Seconds-resolution "last activity" clock, cheaper to share across tasks
/// than an `Instant` behind a lock.
struct AtomicAsSecs {
    epoch: Instant,
    secs: AtomicI64,
}

impl AtomicAsSecs {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            secs: AtomicI64::new(0),
        }
    }

    fn touch(&self) {
        self.secs
            .store(self.epoch.elapsed().as_secs() as i64, Ordering::SeqCst);
    }

    fn elapsed(&self) -> Duration {
        let now = self.epoch.elapsed().as_secs() as i64;
        let last = self.secs.load(Ordering::SeqCst);
        Duration::from_secs((now - last).max(0) as u64)
    }
}
