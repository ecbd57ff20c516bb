use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sandbox::{BindMode, BindSpec, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BwrapperConfig {
    pub sandbox: SandboxSettings,
    pub run: RunSettings,
}

/// Profile settings. Every field left unset falls back to the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Path to the bwrap binary, or its name when it is on `PATH`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Flags passed to bwrap before any mount.
    /// Avoid removing --unshare-all, --die-with-parent, and the /proc and /dev mounts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_args: Option<Vec<String>>,
    /// Host paths mounted read-only inside the sandbox
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_binds: Option<Vec<String>>,
    /// Host paths mounted with write access inside the sandbox
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_binds: Option<Vec<String>>,
    /// What to do with malformed bind entries
    pub bind_mode: BindMode,
}

/// Defaults applied to every command run from the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Command timeout in seconds, 0 disables it
    pub timeout_seconds: u64,
    /// Extra binds added before the ones given on the command line
    pub binds: Vec<BindSpec>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT.as_secs(),
            binds: Vec::new(),
        }
    }
}

impl RunSettings {
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
