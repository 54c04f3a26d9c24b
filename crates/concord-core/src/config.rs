use crate::error::{ConcordError, Result};
use crate::record::ActionRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "concord.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deepest sync hop allowed inside one burst.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Most records one burst may append.
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,
    /// Completed records kept for inspection.
    #[serde(default = "default_history")]
    pub history: usize,
}

fn default_max_depth() -> u32 {
    32
}

fn default_max_actions() -> usize {
    1024
}

fn default_history() -> usize {
    4096
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_actions: default_max_actions(),
            history: default_history(),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestingConfig {
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// `/Concept/action` paths invoked directly instead of via `Requesting.request`.
    #[serde(default)]
    pub passthrough: Vec<String>,
}

fn default_base_path() -> String {
    "/api".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for RequestingConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            timeout_ms: default_timeout_ms(),
            passthrough: Vec::new(),
        }
    }
}

impl RequestingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The concept action a passthrough path maps to, if `path` is listed.
    pub fn passthrough_action(&self, path: &str) -> Option<ActionRef> {
        if self.passthrough.iter().any(|p| p == path) {
            ActionRef::from_path(path)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig / StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// redb file backing concept state; in-memory when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub requesting: RequestingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConcordError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ConcordError::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Engine limits must be positive
        if self.engine.max_depth == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "engine.max_depth must be greater than 0".to_string(),
            });
        }
        if self.engine.max_actions == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "engine.max_actions must be greater than 0".to_string(),
            });
        }

        // 2. A zero timeout fails every request that needs a sync to respond
        if self.requesting.timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "requesting.timeout_ms must be greater than 0".to_string(),
            });
        }

        // 3. Base path shape
        if !self.requesting.base_path.starts_with('/') {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "requesting.base_path '{}' should start with '/'",
                    self.requesting.base_path
                ),
            });
        }

        // 4. Passthrough entries must name a concept action
        for path in &self.requesting.passthrough {
            if ActionRef::from_path(path).is_none() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "requesting.passthrough entry '{path}' is not of the form /Concept/action"
                    ),
                });
            }
        }

        warnings
    }
}
