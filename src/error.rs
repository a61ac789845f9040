//! Typed error surface for the core daemon/client contract.
//!
//! Internal plumbing (file reads, ad-hoc JSON decoding) uses `anyhow`, but
//! anything that crosses a handler boundary or decides a process exit code
//! is one of these variants so `main.rs` can map it deterministically.

use thiserror::Error;

/// Error kinds from spec §7.
#[derive(Debug, Error)]
pub enum LspcError {
    #[error("connection refused: no daemon listening at {0}")]
    ConnectionRefused(String),

    #[error("daemon did not become reachable within the startup window")]
    DaemonStartTimeout,

    #[error("failed to spawn language server: {0}")]
    ServerSpawnFailed(String),

    #[error("language server failed to initialize: {0}")]
    ServerInitFailed(String),

    #[error("language server exited unexpectedly")]
    ServerExited,

    #[error("timed out waiting for a response")]
    Timeout,

    #[error("no language server is registered for extension {0:?}")]
    NoDescriptor(String),

    #[error("malformed LSP message framing: {0}")]
    ProtocolError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LspcError {
    /// Process exit code a short-lived client should use when this error is
    /// the terminal outcome of a request, per spec §7.
    ///
    /// `diagnostics` overrides this in its own handler (2 when findings are
    /// present, 0 when clean) — this mapping only applies to the generic
    /// "request failed" path.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, LspcError>;
