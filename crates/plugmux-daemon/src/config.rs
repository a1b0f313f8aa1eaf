//! Launch configuration for plugin child processes

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use plugmux_core::prelude::*;

/// How to launch one plugin child process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpawnConfig {
    /// Plugin identity string, used only in diagnostics.
    pub identity: String,

    /// Executable to run.
    pub command: String,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory; inherits the daemon's when absent.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl SpawnConfig {
    pub fn new(identity: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Reject configurations that cannot possibly spawn.
    pub fn validate(&self) -> Result<()> {
        if self.identity.is_empty() {
            return Err(Error::config("plugin identity must not be empty"));
        }
        if self.command.is_empty() {
            return Err(Error::config("plugin command must not be empty"));
        }
        Ok(())
    }
}
