//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXSTORE_CONFIG` (environment variable)
//! 2. `~/.config/mboxstore/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxstore\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::parser::mbox::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_READ_BUFFER_SIZE};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Ingestion settings.
    pub ingest: IngestConfig,
    /// Search settings.
    pub search: SearchConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the store directory (index, records, and logs).
    pub data_dir: Option<PathBuf>,
}

/// Ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Read buffer size in bytes (default: 1048576 = 1 MB).
    pub read_buffer_size: usize,
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    pub max_message_size: usize,
    /// Labels applied to every ingested message.
    pub default_labels: Vec<String>,
    /// Skip messages whose msgid is already indexed.
    pub skip_duplicates: bool,
}

/// Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results fetched per page.
    pub page_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            data_dir: None,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            default_labels: vec!["inbox".to_string()],
            skip_duplicates: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from a specific file, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXSTORE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mboxstore").join("config.toml"))
}

/// Return the store directory.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxstore")
}

/// Return the log file path inside a store directory.
pub fn log_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("mboxstore.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.ingest.default_labels, vec!["inbox".to_string()]);
        assert!(cfg.ingest.skip_duplicates);
        assert_eq!(cfg.search.page_size, 20);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.general.log_level, cfg.general.log_level);
        assert_eq!(parsed.ingest.read_buffer_size, cfg.ingest.read_buffer_size);
        assert_eq!(parsed.search.page_size, cfg.search.page_size);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[general]
data_dir = "/tmp/mail"

[ingest]
default_labels = ["archive", "imported"]
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(data_dir(&cfg), PathBuf::from("/tmp/mail"));
        assert_eq!(cfg.ingest.default_labels, vec!["archive", "imported"]);
        // Other fields use defaults
        assert!(cfg.ingest.skip_duplicates);
        assert_eq!(cfg.search.page_size, 20);
    }

    #[test]
    fn test_load_config_from_bad_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search]\npage_size = \"many\"\n").unwrap();
        assert_eq!(load_config_from(&path).search.page_size, 20);
        assert_eq!(
            load_config_from(&dir.path().join("missing.toml")).general.log_level,
            "warn"
        );
    }
}
