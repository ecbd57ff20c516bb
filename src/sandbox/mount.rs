use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BwrapperError, Result};

/// A canonical bind mount exposing a host path inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub from: String,
    pub to: String,
    pub read_only: bool,
}

impl BindMount {
    /// Mount `path` at the same location, read-only.
    pub fn same_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            from: path.clone(),
            to: path,
            read_only: true,
        }
    }

    /// The bwrap flag for this mount (`--ro-bind` or `--bind`).
    pub fn flag(&self) -> &'static str {
        if self.read_only {
            "--ro-bind"
        } else {
            "--bind"
        }
    }
}

/// A bind mount as supplied by a caller, before normalization.
///
/// Deserializes from either a bare path string or a `{ from, to, read_only }`
/// table. Anything else is kept as `Unrecognized` so that normalization can
/// decide what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindSpec {
    Path(String),
    Descriptor {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        read_only: Option<bool>,
    },
    Unrecognized(serde_json::Value),
}

impl BindSpec {
    /// Shorthand for an explicit `from -> to` mount.
    pub fn mount(from: impl Into<String>, to: impl Into<String>, read_only: bool) -> Self {
        Self::Descriptor {
            from: Some(from.into()),
            to: Some(to.into()),
            read_only: Some(read_only),
        }
    }

    fn to_bind_mount(&self) -> Option<BindMount> {
        match self {
            Self::Path(path) if !path.is_empty() => Some(BindMount::same_path(path.as_str())),
            Self::Descriptor {
                from: Some(from),
                to: Some(to),
                read_only,
            } if !from.is_empty() && !to.is_empty() => Some(BindMount {
                from: from.clone(),
                to: to.clone(),
                read_only: read_only.unwrap_or(true),
            }),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

impl From<&str> for BindSpec {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for BindSpec {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<BindMount> for BindSpec {
    fn from(mount: BindMount) -> Self {
        Self::mount(mount.from, mount.to, mount.read_only)
    }
}

/// How malformed bind entries are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Drop malformed entries without reporting them
    #[default]
    Lenient,
    /// Reject the whole request on the first malformed entry
    Strict,
}

/// Canonicalize caller-supplied binds, preserving input order.
pub fn normalize_binds(specs: &[BindSpec], mode: BindMode) -> Result<Vec<BindMount>> {
    let mut normalized = Vec::with_capacity(specs.len());

    for spec in specs {
        match spec.to_bind_mount() {
            Some(mount) => normalized.push(mount),
            None if mode == BindMode::Strict => {
                return Err(BwrapperError::InvalidBind {
                    entry: spec.describe(),
                });
            }
            None => debug!(entry = %spec.describe(), "Dropping malformed bind entry"),
        }
    }

    Ok(normalized)
}

/// Parse a command-line bind spec: `SRC`, `SRC:DST` or `SRC:DST:ro|rw`.
pub fn parse_bind_arg(s: &str) -> std::result::Result<BindSpec, String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [path] => Ok(BindSpec::Path(path.to_string())),
        [from, to] => Ok(BindSpec::Descriptor {
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            read_only: None,
        }),
        [from, to, "ro"] => Ok(BindSpec::mount(*from, *to, true)),
        [from, to, "rw"] => Ok(BindSpec::mount(*from, *to, false)),
        _ => Err("Bind format: src[:dst[:ro|rw]]".to_string()),
    }
}
