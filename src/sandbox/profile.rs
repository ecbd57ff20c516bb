use std::path::Path;

use serde::Serialize;

use crate::config::types::SandboxSettings;

/// Isolator used when the configuration does not name one.
pub const DEFAULT_BINARY: &str = "bwrap";

/// `PATH` exported inside the sandbox by the default base arguments.
pub const SANDBOX_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Immutable description of how every sandbox is set up.
///
/// One profile is built from configuration at startup and shared, read-only,
/// by every invocation. The base arguments are trusted as given: callers
/// should not strip `--unshare-all`, `--die-with-parent` or the `/proc` and
/// `/dev` mounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxProfile {
    binary: String,
    base_args: Vec<String>,
    read_only_binds: Vec<String>,
    write_binds: Vec<String>,
}

impl Default for SandboxProfile {
    fn default() -> Self {
        Self::new(
            DEFAULT_BINARY,
            default_base_args(),
            default_read_only_binds(),
            default_write_binds(),
        )
    }
}

impl SandboxProfile {
    pub fn new(
        binary: impl Into<String>,
        base_args: Vec<String>,
        read_only_binds: Vec<String>,
        write_binds: Vec<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            base_args,
            read_only_binds,
            write_binds,
        }
    }

    /// Build a profile from configuration, falling back to the built-in
    /// default for every field that is not set.
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            binary: settings
                .binary
                .clone()
                .unwrap_or_else(|| DEFAULT_BINARY.to_string()),
            base_args: settings
                .base_args
                .clone()
                .unwrap_or_else(default_base_args),
            read_only_binds: settings
                .read_only_binds
                .clone()
                .unwrap_or_else(default_read_only_binds),
            write_binds: settings
                .write_binds
                .clone()
                .unwrap_or_else(default_write_binds),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn base_args(&self) -> &[String] {
        &self.base_args
    }

    pub fn read_only_binds(&self) -> &[String] {
        &self.read_only_binds
    }

    pub fn write_binds(&self) -> &[String] {
        &self.write_binds
    }
}

/// Flags passed to bwrap before any mount.
pub fn default_base_args() -> Vec<String> {
    [
        "--unshare-all",
        "--die-with-parent",
        "--new-session",
        "--proc",
        "/proc",
        "--dev",
        "/dev",
        "--tmpfs",
        "/tmp",
        "--tmpfs",
        "/run",
        "--setenv",
        "PATH",
        SANDBOX_PATH,
        "--chdir",
        "/tmp",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

/// Host paths mounted read-only, with `/lib64` only when the host has it.
pub fn default_read_only_binds() -> Vec<String> {
    read_only_binds_for_host(Path::new("/lib64").is_dir())
}

fn read_only_binds_for_host(has_lib64: bool) -> Vec<String> {
    let mut paths: Vec<String> = [
        "/usr",
        "/bin",
        "/lib",
        "/sbin",
        "/etc/resolv.conf",
        "/etc/ssl",
    ]
    .iter()
    .map(|path| path.to_string())
    .collect();

    if has_lib64 {
        paths.push("/lib64".to_string());
    }

    paths
}

pub fn default_write_binds() -> Vec<String> {
    vec!["/tmp".to_string()]
}
