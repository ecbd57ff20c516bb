//! Bubblewrap invocation core.
//!
//! A [`CommandRequest`] flows through bind normalization, the executable
//! check, and argument assembly before the [`SandboxRunner`] hands the
//! resulting [`Invocation`] to a [`ProcessSpawner`].

mod assembler;
mod mount;
mod profile;
mod resolver;
mod runner;
mod spawner;

pub use assembler::{assemble, Invocation};
pub use mount::{normalize_binds, parse_bind_arg, BindMode, BindMount, BindSpec};
pub use profile::{
    default_base_args, default_read_only_binds, default_write_binds, SandboxProfile,
    DEFAULT_BINARY, SANDBOX_PATH,
};
pub use resolver::{
    is_executable, ExecutableResolver, FixedSearchPath, PathResolver, ProcessSearchPath,
    SearchPath,
};
pub use runner::{CommandRequest, SandboxRunner, DEFAULT_TIMEOUT};
pub use spawner::{PreparedProcess, ProcessOutcome, ProcessSpawner, TokioSpawner};

/// Result of a sandboxed command that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}
