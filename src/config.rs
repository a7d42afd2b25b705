//! Application configuration
//!
//! Loaded from TOML, owned by the caller — there is no global config state.
//!
//! ## Loading Order
//!
//! 1. `SEMGRAPH_CONFIG` environment variable (path to TOML file)
//! 2. `semgraph.toml` in the current working directory
//! 3. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub generator: GeneratorConfig,
    pub search: SearchConfig,
}

/// Primary and companion store locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the primary store file.
    pub graph_path: PathBuf,
    /// Companion vector store path. Derived from `graph_path`
    /// (`graph.tsv` → `graph_semantics.tsv`) when unset.
    pub semantics_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            graph_path: PathBuf::from("graph.tsv"),
            semantics_path: None,
        }
    }
}

/// External vector generator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command to run. Unset means no generator is available — sync is
    /// refused and search falls back to keyword matching.
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Records per generator call.
    pub batch_size: usize,
    /// Per-batch timeout in seconds. 0 disables the bound.
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            batch_size: 32,
            timeout_secs: 120,
        }
    }
}

impl GeneratorConfig {
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

/// Search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { top_k: 10 }
    }
}

impl AppConfig {
    /// Load configuration following the documented order. Missing files
    /// fall through to defaults; a present-but-broken file is a warning,
    /// not a crash.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("SEMGRAPH_CONFIG") {
            match Self::from_path(Path::new(&path)) {
                Ok(config) => {
                    tracing::info!(path = %path, "config loaded from SEMGRAPH_CONFIG");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "SEMGRAPH_CONFIG unusable, trying fallbacks");
                }
            }
        }

        let local = Path::new("semgraph.toml");
        if local.exists() {
            match Self::from_path(local) {
                Ok(config) => {
                    tracing::info!("config loaded from ./semgraph.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "./semgraph.toml unusable, using defaults");
                }
            }
        }

        tracing::debug!("using built-in default config");
        Self::default()
    }

    /// Parse a specific TOML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Effective companion store path.
    pub fn semantics_path(&self) -> PathBuf {
        self.store.semantics_path.clone().unwrap_or_else(|| {
            crate::embedding::companion_path(&self.store.graph_path)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.store.graph_path, PathBuf::from("graph.tsv"));
        assert_eq!(config.semantics_path(), PathBuf::from("graph_semantics.tsv"));
        assert_eq!(config.generator.batch_size, 32);
        assert_eq!(config.generator.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.search.top_k, 10);
        assert!(config.generator.command.is_none());
    }

    #[test]
    fn test_from_path_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("semgraph.toml");
        std::fs::write(
            &path,
            r#"
[store]
graph_path = "brain/graph.tsv"

[generator]
command = "embed-worker"
args = ["--model", "minilm"]
timeout_secs = 0
"#,
        )
        .unwrap();

        let config = AppConfig::from_path(&path).unwrap();
        assert_eq!(config.store.graph_path, PathBuf::from("brain/graph.tsv"));
        assert_eq!(
            config.semantics_path(),
            PathBuf::from("brain/graph_semantics.tsv")
        );
        assert_eq!(config.generator.command.as_deref(), Some("embed-worker"));
        assert_eq!(config.generator.timeout(), None);
        // Unset sections keep defaults
        assert_eq!(config.search.top_k, 10);
        assert_eq!(config.generator.batch_size, 32);
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("semgraph.toml");
        std::fs::write(&path, "not [valid toml").unwrap();
        assert!(matches!(
            AppConfig::from_path(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
