use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tracing::trace;

/// Source of the executable search path.
pub trait SearchPath: Send + Sync {
    /// The raw `PATH`-style value, or `None` when unset.
    fn search_path(&self) -> Option<OsString>;
}

/// Reads `PATH` from the current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSearchPath;

impl SearchPath for ProcessSearchPath {
    fn search_path(&self) -> Option<OsString> {
        std::env::var_os("PATH")
    }
}

/// A fixed search path, independent of the process environment.
#[derive(Debug, Clone, Default)]
pub struct FixedSearchPath(pub Option<OsString>);

impl FixedSearchPath {
    pub fn new(value: impl Into<OsString>) -> Self {
        Self(Some(value.into()))
    }

    pub fn unset() -> Self {
        Self(None)
    }
}

impl SearchPath for FixedSearchPath {
    fn search_path(&self) -> Option<OsString> {
        self.0.clone()
    }
}

/// Decides whether the isolator binary can be executed.
pub trait ExecutableResolver: Send + Sync {
    fn is_available(&self, binary: &str) -> bool;
}

/// Checks the binary as given, then each entry of the search path.
#[derive(Debug, Clone, Default)]
pub struct PathResolver<S = ProcessSearchPath> {
    search_path: S,
}

impl PathResolver<ProcessSearchPath> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: SearchPath> PathResolver<S> {
    pub fn with_search_path(search_path: S) -> Self {
        Self { search_path }
    }

    /// Look for `binary` under each entry of the search path.
    pub fn exists_in_search_path(&self, binary: &str) -> bool {
        let Some(paths) = self.search_path.search_path() else {
            return false;
        };
        if paths.is_empty() {
            return false;
        }

        let found = which::which_in(binary, Some(&paths), working_dir());
        trace!(binary, found = ?found.as_ref().ok(), "Probed search path");
        found.is_ok()
    }
}

impl<S: SearchPath> ExecutableResolver for PathResolver<S> {
    fn is_available(&self, binary: &str) -> bool {
        if binary.is_empty() {
            return false;
        }
        is_executable(Path::new(binary)) || self.exists_in_search_path(binary)
    }
}

/// True when `path`, taken as given (relative to the working directory),
/// is a file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let path = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => path.to_path_buf(),
        _ => Path::new(".").join(path),
    };
    which::which_in(&path, None::<&OsStr>, working_dir()).is_ok()
}

fn working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}
