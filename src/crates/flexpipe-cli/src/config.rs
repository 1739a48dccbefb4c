//! Shell configuration
//!
//! Loaded from a TOML file when one is given, with defaults that work out
//! of the box.

use crate::error::{Result, ShellError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the operator shell
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Directory for tagged pipelines, switch responses, request logs, and
    /// compile artifacts
    pub output_dir: PathBuf,

    /// External P4 compiler executable
    pub compiler: String,

    /// Device id used when `connect` is given without one
    pub default_device_id: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("flexpipe_output"),
            compiler: "p4c".to_string(),
            default_device_id: 0,
        }
    }
}

impl ShellConfig {
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ShellError::Config(format!("failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| ShellError::Config(format!("failed to parse config: {e}")))
    }
}
