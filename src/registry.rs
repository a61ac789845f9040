//! Declarative table of supported language servers (C3).
//!
//! A static, data-only list shipped with the binary, optionally extended or
//! overridden by the `[[servers]]` table in `config.toml`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-descriptor rule for when diagnostics are considered complete for a
/// file, per spec §3/§4.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiagnosticsReadyPredicate {
    /// The first `publishDiagnostics` for the opened version is authoritative.
    PublishDiagnostics,
    /// The server supports pull diagnostics (`textDocument/diagnostic`).
    PullDiagnostics,
    /// Wait until no new batch has arrived for this long since the last one.
    QuiescenceWindow(#[serde(with = "duration_ms")] Duration),
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Static description of how to run one kind of language server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Stable string identity, e.g. `"rust-analyzer"`.
    pub id: String,
    /// Sent as the LSP `languageId` for opened documents.
    pub language_id: String,
    /// File extensions this server handles, including the leading dot.
    pub file_extensions: Vec<String>,
    /// Relative filenames/dirnames that mark a project root.
    pub root_markers: Vec<String>,
    /// Argv used to spawn the server (`command[0]` is the executable).
    pub command: Vec<String>,
    /// Opaque `initializationOptions` sent with `initialize`.
    #[serde(default)]
    pub init_options: serde_json::Value,
    /// Rule for deciding when diagnostics are complete.
    pub diagnostics_ready: DiagnosticsReadyPredicate,
}

impl ServerDescriptor {
    fn matches_extension(&self, ext: &str) -> bool {
        self.file_extensions.iter().any(|e| e == ext)
    }
}

/// The set of descriptors known to a daemon, built from built-ins merged
/// with user overrides from `config.toml`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    descriptors: Vec<ServerDescriptor>,
}

impl Registry {
    /// Built-ins merged with `overrides` (an override with a matching `id`
    /// replaces the built-in; a new `id` is appended).
    pub fn new(overrides: Vec<ServerDescriptor>) -> Self {
        let mut descriptors = builtin_defaults();
        for over in overrides {
            if let Some(existing) = descriptors.iter_mut().find(|d| d.id == over.id) {
                *existing = over;
            } else {
                descriptors.push(over);
            }
        }
        Self { descriptors }
    }

    pub fn builtin() -> Self {
        Self {
            descriptors: builtin_defaults(),
        }
    }

    /// First descriptor whose `file_extensions` contains `ext`. No
    /// fall-through on ambiguity, per spec §4.3.
    pub fn by_extension(&self, ext: &str) -> Option<&ServerDescriptor> {
        self.descriptors.iter().find(|d| d.matches_extension(ext))
    }

    pub fn by_language_id(&self, language_id: &str) -> Option<&ServerDescriptor> {
        self.descriptors.iter().find(|d| d.language_id == language_id)
    }

    pub fn all(&self) -> &[ServerDescriptor] {
        &self.descriptors
    }
}

fn ext(s: &str) -> String {
    s.to_string()
}

/// Built-in descriptors for the languages this daemon supports out of the
/// box. Root markers and spawn argv follow what each server actually
/// expects on stdio.
pub fn builtin_defaults() -> Vec<ServerDescriptor> {
    vec![
        ServerDescriptor {
            id: "rust-analyzer".into(),
            language_id: "rust".into(),
            file_extensions: vec![ext(".rs")],
            root_markers: vec!["Cargo.toml".into()],
            command: vec!["rust-analyzer".into()],
            init_options: serde_json::Value::Null,
            diagnostics_ready: DiagnosticsReadyPredicate::QuiescenceWindow(Duration::from_millis(400)),
        },
        ServerDescriptor {
            id: "typescript-language-server".into(),
            language_id: "typescript".into(),
            file_extensions: vec![ext(".ts"), ext(".tsx")],
            root_markers: vec!["tsconfig.json".into(), "package.json".into()],
            command: vec!["typescript-language-server".into(), "--stdio".into()],
            init_options: serde_json::Value::Null,
            diagnostics_ready: DiagnosticsReadyPredicate::QuiescenceWindow(Duration::from_millis(400)),
        },
        ServerDescriptor {
            id: "typescript-language-server-js".into(),
            language_id: "javascript".into(),
            file_extensions: vec![ext(".js"), ext(".jsx"), ext(".mjs")],
            root_markers: vec!["tsconfig.json".into(), "package.json".into()],
            command: vec!["typescript-language-server".into(), "--stdio".into()],
            init_options: serde_json::Value::Null,
            diagnostics_ready: DiagnosticsReadyPredicate::QuiescenceWindow(Duration::from_millis(400)),
        },
        ServerDescriptor {
            id: "gopls".into(),
            language_id: "go".into(),
            file_extensions: vec![ext(".go")],
            root_markers: vec!["go.mod".into()],
            command: vec!["gopls".into()],
            init_options: serde_json::Value::Null,
            diagnostics_ready: DiagnosticsReadyPredicate::PublishDiagnostics,
        },
        ServerDescriptor {
            id: "pylsp".into(),
            language_id: "python".into(),
            file_extensions: vec![ext(".py")],
            root_markers: vec!["pyproject.toml".into(), "setup.py".into()],
            command: vec!["pylsp".into()],
            init_options: serde_json::Value::Null,
            diagnostics_ready: DiagnosticsReadyPredicate::PublishDiagnostics,
        },
        ServerDescriptor {
            id: "dart".into(),
            language_id: "dart".into(),
            file_extensions: vec![ext(".dart")],
            root_markers: vec!["pubspec.yaml".into()],
            command: vec!["dart".into(), "language-server".into(), "--protocol=lsp".into()],
            init_options: serde_json::Value::Null,
            diagnostics_ready: DiagnosticsReadyPredicate::QuiescenceWindow(Duration::from_millis(400)),
        },
        ServerDescriptor {
            id: "vscode-json-language-server".into(),
            language_id: "json".into(),
            file_extensions: vec![ext(".json")],
            root_markers: vec![],
            command: vec!["vscode-json-language-server".into(), "--stdio".into()],
            init_options: serde_json::Value::Null,
            diagnostics_ready: DiagnosticsReadyPredicate::PublishDiagnostics,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_defaults_covers_seven_languages() {
        let r = Registry::builtin();
        let ids: Vec<&str> = r.all().iter().map(|d| d.language_id.as_str()).collect();
        for lang in ["rust", "typescript", "javascript", "go", "python", "dart", "json"] {
            assert!(ids.contains(&lang), "missing {lang}");
        }
    }

    #[test]
    fn by_extension_finds_rust() {
        let r = Registry::builtin();
        let d = r.by_extension(".rs").expect("rs descriptor");
        assert_eq!(d.language_id, "rust");
    }

    #[test]
    fn by_extension_returns_none_for_unknown() {
        let r = Registry::builtin();
        assert!(r.by_extension(".java").is_none());
    }

    #[test]
    fn by_extension_has_no_fallthrough_on_ambiguity() {
        // .ts only matches the typescript descriptor, never the js one.
        let r = Registry::builtin();
        let d = r.by_extension(".ts").unwrap();
        assert_eq!(d.id, "typescript-language-server");
    }

    #[test]
    fn override_with_matching_id_replaces_builtin() {
        let custom = ServerDescriptor {
            id: "gopls".into(),
            language_id: "go".into(),
            file_extensions: vec![".go".into()],
            root_markers: vec!["go.work".into()],
            command: vec!["gopls".into(), "-remote=auto".into()],
            init_options: serde_json::Value::Null,
            diagnostics_ready: DiagnosticsReadyPredicate::PublishDiagnostics,
        };
        let r = Registry::new(vec![custom]);
        let d = r.by_extension(".go").unwrap();
        assert_eq!(d.root_markers, vec!["go.work".to_string()]);
        assert_eq!(r.all().iter().filter(|d| d.language_id == "go").count(), 1);
    }

    #[test]
    fn override_with_new_id_is_appended() {
        let custom = ServerDescriptor {
            id: "ruff".into(),
            language_id: "python-ruff".into(),
            file_extensions: vec![".py".into()],
            root_markers: vec![],
            command: vec!["ruff-lsp".into()],
            init_options: serde_json::Value::Null,
            diagnostics_ready: DiagnosticsReadyPredicate::PublishDiagnostics,
        };
        let r = Registry::new(vec![custom]);
        assert!(r.by_language_id("python-ruff").is_some());
        assert!(r.by_language_id("python").is_some());
    }
}
