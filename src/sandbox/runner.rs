use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{BwrapperError, Result};
use crate::sandbox::assembler::{assemble, is_runnable, Invocation};
use crate::sandbox::mount::{normalize_binds, BindMode, BindSpec};
use crate::sandbox::profile::SandboxProfile;
use crate::sandbox::resolver::{ExecutableResolver, PathResolver};
use crate::sandbox::spawner::{PreparedProcess, ProcessOutcome, ProcessSpawner, TokioSpawner};
use crate::sandbox::CommandResult;

/// Timeout applied when a request does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One request to run a command inside the sandbox.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Program and arguments to run inside the sandbox.
    pub command: Vec<String>,
    /// Additional mounts, appended after the profile's own.
    pub extra_binds: Vec<BindSpec>,
    pub working_directory: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    /// `None` disables the timeout.
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            extra_binds: Vec::new(),
            working_directory: None,
            environment: BTreeMap::new(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    #[must_use]
    pub fn with_bind(mut self, bind: impl Into<BindSpec>) -> Self {
        self.extra_binds.push(bind.into());
        self
    }

    #[must_use]
    pub fn with_binds<I>(mut self, binds: I) -> Self
    where
        I: IntoIterator<Item = BindSpec>,
    {
        self.extra_binds.extend(binds);
        self
    }

    #[must_use]
    pub fn with_working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }
}

/// Turns [`CommandRequest`]s into sandboxed processes.
///
/// Cheap to clone; clones share the same profile and collaborators and can be
/// used from any number of tasks at once.
#[derive(Clone)]
pub struct SandboxRunner {
    profile: Arc<SandboxProfile>,
    resolver: Arc<dyn ExecutableResolver>,
    spawner: Arc<dyn ProcessSpawner>,
    bind_mode: BindMode,
}

impl SandboxRunner {
    /// Runner using `PATH` lookup and tokio process spawning.
    pub fn new(profile: impl Into<Arc<SandboxProfile>>) -> Self {
        Self {
            profile: profile.into(),
            resolver: Arc::new(PathResolver::new()),
            spawner: Arc::new(TokioSpawner),
            bind_mode: BindMode::default(),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ExecutableResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    #[must_use]
    pub fn with_bind_mode(mut self, mode: BindMode) -> Self {
        self.bind_mode = mode;
        self
    }

    pub fn profile(&self) -> &SandboxProfile {
        &self.profile
    }

    pub fn bind_mode(&self) -> BindMode {
        self.bind_mode
    }

    /// Whether the profile's isolator binary can be executed.
    pub fn is_available(&self) -> bool {
        self.resolver.is_available(self.profile.binary())
    }

    /// Assemble the argument vector that would run `command`.
    pub fn build_command(&self, command: &[String], extra_binds: &[BindSpec]) -> Result<Invocation> {
        if !is_runnable(command) {
            return Err(BwrapperError::InvalidCommand);
        }
        let binds = normalize_binds(extra_binds, self.bind_mode)?;
        assemble(&self.profile, command, &binds, self.resolver.as_ref())
    }

    /// Configure, but do not start, the process for `request`.
    pub fn prepare(&self, request: &CommandRequest) -> Result<PreparedProcess> {
        let invocation = self.build_command(&request.command, &request.extra_binds)?;

        Ok(PreparedProcess {
            invocation,
            working_directory: request.working_directory.clone(),
            environment: request.environment.clone(),
            timeout: request.timeout,
        })
    }

    /// Run `request` to completion.
    ///
    /// Fails with [`BwrapperError::ExecutionFailure`] on a non-zero exit and
    /// with [`BwrapperError::Timeout`] when the timeout elapsed first.
    pub async fn run(&self, request: &CommandRequest) -> Result<CommandResult> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but kills the process and fails with
    /// [`BwrapperError::Cancelled`] once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        request: &CommandRequest,
        cancel: CancellationToken,
    ) -> Result<CommandResult> {
        let process = self.prepare(request)?;
        self.execute(&process, cancel).await
    }

    /// Start an already prepared process and interpret how it ended.
    pub async fn execute(
        &self,
        process: &PreparedProcess,
        cancel: CancellationToken,
    ) -> Result<CommandResult> {
        debug!(invocation = %process.invocation, "Executing sandboxed command");

        match self.spawner.spawn(process, cancel).await? {
            ProcessOutcome::Exited {
                code: Some(0),
                stdout,
                stderr,
            } => {
                info!(program = %process.program(), "Sandboxed command succeeded");
                Ok(CommandResult {
                    stdout,
                    stderr,
                    exit_code: 0,
                })
            }
            ProcessOutcome::Exited {
                code,
                stdout,
                stderr,
            } => Err(BwrapperError::ExecutionFailure {
                exit_code: code,
                stdout,
                stderr,
            }),
            ProcessOutcome::TimedOut { stdout, stderr } => Err(BwrapperError::Timeout {
                timeout: process.timeout.unwrap_or_default(),
                stdout,
                stderr,
            }),
            ProcessOutcome::Cancelled => Err(BwrapperError::Cancelled),
        }
    }
}
