use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BwrapperError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    // Assembly errors, raised before anything is spawned
    #[error("You must provide a command to run inside the sandbox")]
    InvalidCommand,

    #[error("Bubblewrap (bwrap) is not available or executable: {binary}")]
    ToolUnavailable { binary: String },

    #[error("Malformed bind mount entry: {entry}")]
    InvalidBind { entry: String },

    // Execution errors, raised after the child was started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", describe_exit(.exit_code))]
    ExecutionFailure {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Sandboxed command timed out after {timeout:?}")]
    Timeout {
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("Sandboxed command was cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("Sandboxed command exited with status {}", code),
        None => "Sandboxed command was terminated by a signal".to_string(),
    }
}

impl BwrapperError {
    /// True when the error was raised before any process was started.
    pub fn is_pre_spawn(&self) -> bool {
        matches!(
            self,
            Self::InvalidCommand | Self::ToolUnavailable { .. } | Self::InvalidBind { .. }
        )
    }

    /// Output captured from the child, if the error carries any.
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match self {
            Self::ExecutionFailure { stdout, stderr, .. } | Self::Timeout { stdout, stderr, .. } => {
                Some((stdout.as_str(), stderr.as_str()))
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BwrapperError>;
