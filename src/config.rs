use crate::error_log::ErrorLevel;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from terminus.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct TerminusConfig {
    /// Emit fallback diagnostics. Off means unreported faults stay silent.
    pub debug: bool,
    pub classifier: ClassifierConfig,
    pub signals: SignalsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Error levels treated as process-ending.
    pub fatal_levels: Vec<ErrorLevel>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    /// Signal names (e.g. `SIGTERM`) reported as fatal errors.
    pub watch: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub filter: String,
}

// --- Default implementations ---

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fatal_levels: ErrorLevel::DEFAULT_FATAL.to_vec(),
        }
    }
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            watch: vec![
                "SIGTERM".to_string(),
                "SIGINT".to_string(),
                "SIGHUP".to_string(),
                "SIGXCPU".to_string(),
            ],
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "terminus=info".to_string(),
        }
    }
}

/// Errors from loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<TerminusConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(TerminusConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
