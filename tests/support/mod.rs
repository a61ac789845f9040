//! Shared helpers for the integration suite: building scripts for
//! `fake_lsp_server` and wiring them into a `Registry`/`SessionManager`
//! without touching any real language server.

#![allow(dead_code)]

use lspc::registry::{DiagnosticsReadyPredicate, Registry, ServerDescriptor};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Write `steps` (a `serde_json::json!({"steps": [...]})` value) to
/// `dir/name` and return its path.
pub fn write_script(dir: &Path, name: &str, steps: Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec(&steps).expect("serialize script")).expect("write script");
    path
}

/// A descriptor that spawns `fake_lsp_server` with `script` as its only
/// argument in place of a real language server binary.
pub fn fake_descriptor(
    id: &str,
    language_id: &str,
    ext: &str,
    script: &Path,
    diagnostics_ready: DiagnosticsReadyPredicate,
) -> ServerDescriptor {
    ServerDescriptor {
        id: id.to_string(),
        language_id: language_id.to_string(),
        file_extensions: vec![ext.to_string()],
        root_markers: vec![],
        command: vec![
            env!("CARGO_BIN_EXE_fake_lsp_server").to_string(),
            script.display().to_string(),
        ],
        init_options: Value::Null,
        diagnostics_ready,
    }
}

pub fn registry_with(descriptor: ServerDescriptor) -> Registry {
    Registry::new(vec![descriptor])
}

/// The standard initialize/initialized prefix every fake script needs
/// before its scenario-specific steps.
pub fn handshake_steps() -> Vec<Value> {
    vec![
        serde_json::json!({ "expect_method": "initialize", "respond": { "capabilities": {} } }),
        serde_json::json!({ "expect_method": "initialized" }),
    ]
}

pub fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}
