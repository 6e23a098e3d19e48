//! # Configuration
//!
//! Manages the loading and parsing of the application's configuration file (`config.yaml`).
//! Every section has defaults, so a missing or empty file still yields a working setup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::domain::paths::{DEFAULT_WORK_DIR, WorkDir};

pub const DEFAULT_CONFIG_PATH: &str = "data/config.yaml";

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Canonical working directory inside the execution target.
    #[serde(default = "default_root")]
    pub root: String,
    /// Real directory the local sandbox maps `root` onto.
    #[serde(default = "default_sandbox_dir")]
    pub sandbox_dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            sandbox_dir: default_sandbox_dir(),
        }
    }
}

fn default_root() -> String {
    DEFAULT_WORK_DIR.to_string()
}
fn default_sandbox_dir() -> String {
    "data/sandbox".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    /// Upper bound on tags processed per tokenizer call.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Remove a markdown fence wrapping a (non-markdown) file body.
    #[serde(default = "default_true")]
    pub strip_code_fences: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            strip_code_fences: true,
        }
    }
}

fn default_max_iterations() -> usize {
    1000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommandsConfig {
    /// Seconds before a running command is abandoned.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            shell: default_shell(),
        }
    }
}

fn default_timeout() -> u64 {
    120
}
fn default_shell() -> String {
    "sh".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: default_log_file(),
            console: true,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_log_file() -> Option<String> {
    Some("data/session.log".to_string())
}

impl AppConfig {
    /// Loads the config from `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: AppConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Validated working directory for the path normaliser.
    pub fn work_dir(&self) -> Result<WorkDir> {
        WorkDir::new(&self.workspace.root)
    }
}
