//! Daemon configuration (ambient §2.3): CLI/env flags override an optional
//! `config.toml`, which overrides built-in defaults — the same layering
//! order the teacher's `DaemonConfig` uses.

use crate::registry::ServerDescriptor;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 900;
const DEFAULT_DIAGNOSTICS_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub idle_timeout_secs: u64,
    pub diagnostics_timeout_ms: u64,
    pub log_level: String,
    pub servers: Vec<ServerDescriptor>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            diagnostics_timeout_ms: DEFAULT_DIAGNOSTICS_TIMEOUT_MS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            servers: Vec::new(),
        }
    }
}

/// On-disk shape of `config.toml`. Every field optional — absence falls
/// through to the built-in default.
#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    idle_timeout_secs: Option<u64>,
    diagnostics_timeout_ms: Option<u64>,
    log: Option<String>,
    #[serde(default)]
    servers: Vec<ServerDescriptor>,
}

/// CLI flags a caller may have parsed; `None` means "not passed", letting
/// the file/default layers show through.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub idle_timeout_secs: Option<u64>,
}

impl DaemonConfig {
    /// Load `<stateDir>/config.toml` if present, then apply environment
    /// variables, then `overrides` (highest priority), matching the
    /// CLI > env > file > default order spec §2.3 specifies.
    pub fn load(state_dir: &Path, overrides: ConfigOverrides) -> Self {
        let mut config = Self::default();

        let toml_path = state_dir.join("config.toml");
        match std::fs::read_to_string(&toml_path) {
            Ok(text) => match toml::from_str::<TomlConfig>(&text) {
                Ok(parsed) => config.apply_toml(parsed),
                Err(e) => warn!(path = %toml_path.display(), error = %e, "ignoring malformed config.toml"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %toml_path.display(), error = %e, "failed to read config.toml"),
        }

        if let Ok(level) = std::env::var("LSPC_LOG") {
            config.log_level = level;
        }
        if let Ok(secs) = std::env::var("LSPC_IDLE_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.idle_timeout_secs = secs;
            }
        }

        if let Some(level) = overrides.log_level {
            config.log_level = level;
        }
        if let Some(secs) = overrides.idle_timeout_secs {
            config.idle_timeout_secs = secs;
        }

        config
    }

    fn apply_toml(&mut self, parsed: TomlConfig) {
        if let Some(v) = parsed.idle_timeout_secs {
            self.idle_timeout_secs = v;
        }
        if let Some(v) = parsed.diagnostics_timeout_ms {
            self.diagnostics_timeout_ms = v;
        }
        if let Some(v) = parsed.log {
            self.log_level = v;
        }
        self.servers = parsed.servers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_falls_back_to_defaults_when_file_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load(tmp.path(), ConfigOverrides::default());
        assert_eq!(config.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn load_applies_toml_then_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "idle_timeout_secs = 120\nlog = \"debug\"\n",
        )
        .unwrap();

        let config = DaemonConfig::load(
            tmp.path(),
            ConfigOverrides {
                log_level: Some("trace".to_string()),
                idle_timeout_secs: None,
            },
        );
        assert_eq!(config.idle_timeout_secs, 120);
        assert_eq!(config.log_level, "trace"); // override wins over file
    }
}
