//! Builds the bwrap argument vector.
//!
//! Order matters: bwrap applies mounts left to right, so a later mount on the
//! same destination replaces an earlier one. Profile mounts are therefore
//! always emitted before caller mounts.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{BwrapperError, Result};
use crate::sandbox::mount::BindMount;
use crate::sandbox::profile::SandboxProfile;
use crate::sandbox::resolver::ExecutableResolver;

/// Fully assembled argument vector; the first element is the isolator binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Invocation {
    parts: Vec<String>,
}

impl Invocation {
    pub fn program(&self) -> &str {
        &self.parts[0]
    }

    /// Everything after the program.
    pub fn args(&self) -> &[String] {
        &self.parts[1..]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.parts
    }

    pub fn into_vec(self) -> Vec<String> {
        self.parts
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join(" "))
    }
}

/// A command needs at least a non-empty program name.
pub(crate) fn is_runnable(command: &[String]) -> bool {
    command.first().is_some_and(|program| !program.is_empty())
}

/// Assemble the invocation for `command`.
///
/// Fails with [`BwrapperError::InvalidCommand`] for an empty command (or an
/// empty program name) and with
/// [`BwrapperError::ToolUnavailable`] when `resolver` cannot find the profile's
/// binary. Neither input is modified.
pub fn assemble(
    profile: &SandboxProfile,
    command: &[String],
    extra_binds: &[BindMount],
    resolver: &dyn ExecutableResolver,
) -> Result<Invocation> {
    if !is_runnable(command) {
        return Err(BwrapperError::InvalidCommand);
    }

    if !resolver.is_available(profile.binary()) {
        return Err(BwrapperError::ToolUnavailable {
            binary: profile.binary().to_string(),
        });
    }

    let capacity = 1
        + profile.base_args().len()
        + 3 * (profile.read_only_binds().len() + profile.write_binds().len() + extra_binds.len())
        + command.len();
    let mut parts = Vec::with_capacity(capacity);

    parts.push(profile.binary().to_string());
    parts.extend(profile.base_args().iter().cloned());

    for path in profile.read_only_binds() {
        parts.extend(["--ro-bind".to_string(), path.clone(), path.clone()]);
    }

    for path in profile.write_binds() {
        parts.extend(["--bind".to_string(), path.clone(), path.clone()]);
    }

    for bind in extra_binds {
        parts.extend([bind.flag().to_string(), bind.from.clone(), bind.to.clone()]);
    }

    parts.extend(command.iter().cloned());

    debug!(
        binary = %profile.binary(),
        arg_count = parts.len() - 1,
        extra_binds = extra_binds.len(),
        "Assembled sandbox invocation"
    );

    Ok(Invocation { parts })
}
