//! Configuration for spawning pipeline stages.
//!
//! Configuration is loaded from `~/.config/chainsh/config.toml`:
//!
//! ```toml
//! cwd = "/srv/data"
//! clear_env = false
//! event_capacity = 64
//!
//! [env]
//! LC_ALL = "C"
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

const CONFIG_FILE: &str = "config.toml";

/// Settings applied to every stage an orchestrator spawns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrchestratorConfig {
    /// Working directory for spawned programs. `None` inherits ours.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables for spawned programs.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Start programs with an empty environment (plus `env`).
    #[serde(default)]
    pub clear_env: bool,

    /// Buffer size of the pipeline event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    64
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cwd: None,
            env: HashMap::new(),
            clear_env: false,
            event_capacity: default_event_capacity(),
        }
    }
}

impl OrchestratorConfig {
    /// Pick the configuration for a run.
    ///
    /// An explicit path must exist. Without one, the per-user file is used
    /// when present and defaults otherwise.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::read(path)?
                .with_context(|| format!("config file {} does not exist", path.display()));
        }

        let Some(path) = Self::user_path() else {
            tracing::debug!("no home directory, using default config");
            return Ok(Self::default());
        };
        match Self::read(&path)? {
            Some(config) => Ok(config),
            None => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// `config.toml` in the platform config directory for chainsh.
    pub fn user_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "chainsh").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Read and parse `path`; `None` when it does not exist.
    fn read(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
        };
        let config = toml::from_str::<Self>(&text)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(Some(config))
    }

    /// Run stages in the given directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable for spawned stages.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Start stages with an empty environment.
    pub fn with_clear_env(mut self, clear_env: bool) -> Self {
        self.clear_env = clear_env;
        self
    }
}
