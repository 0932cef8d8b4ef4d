//! Canonical relative paths for package contents.
//!
//! One rule set decides whether a path is safe, whether it came from a
//! manifest reference, an archive entry name, or a caller-supplied target
//! prefix:
//!
//! - `\` is treated as a separator, so `a\b` and `a/b` are the same path
//! - absolute paths and drive/volume markers (`C:`, `\\server`) are rejected;
//!   a `:` only counts as a volume marker in the first segment, so
//!   `foo:bar.bpmn` is rejected while `dir/foo:bar.bpmn` is accepted
//! - `.` segments and empty segments are dropped, `..` pops a segment
//! - a `..` that would climb above the root is rejected
//! - an empty result is rejected
//!
//! The canonical form uses `/` separators with no leading or trailing slash.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::core::error::TransferError;

/// Why a path was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathErrorKind {
    Empty,
    Absolute,
    Volume,
    Escape,
    NulByte,
}

impl fmt::Display for PathErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathErrorKind::Empty => write!(f, "path is empty"),
            PathErrorKind::Absolute => write!(f, "absolute paths are not allowed"),
            PathErrorKind::Volume => write!(f, "drive or volume markers are not allowed"),
            PathErrorKind::Escape => write!(f, "path escapes the package root"),
            PathErrorKind::NulByte => write!(f, "path contains a NUL byte"),
        }
    }
}

/// A path rejected by [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub path: String,
    pub kind: PathErrorKind,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`: {}", self.path, self.kind)
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for TransferError {
    fn from(err: PathError) -> Self {
        TransferError::Path {
            path: err.path,
            reason: err.kind.to_string(),
        }
    }
}

/// Validate and canonicalize a relative path.
pub fn normalize(raw: &str) -> Result<String, PathError> {
    let fail = |kind| {
        Err(PathError {
            path: raw.to_string(),
            kind,
        })
    };

    if raw.contains('\0') {
        return fail(PathErrorKind::NulByte);
    }

    let unified = raw.replace('\\', "/");

    if unified.starts_with('/') {
        // `\\server\share` lands here too
        return fail(PathErrorKind::Absolute);
    }
    if has_volume_marker(&unified) {
        return fail(PathErrorKind::Volume);
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return fail(PathErrorKind::Escape);
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return fail(PathErrorKind::Empty);
    }

    Ok(segments.join("/"))
}

/// Normalize a target prefix. An empty (or all-whitespace) prefix means the
/// repository root and yields an empty string.
pub fn normalize_prefix(raw: &str) -> Result<String, PathError> {
    if raw.trim().is_empty() {
        return Ok(String::new());
    }
    normalize(raw)
}

/// Join a normalized prefix and a normalized relative path.
pub fn join(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Resolve a canonical path under a filesystem root.
pub fn to_native(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Convert a filesystem path relative to some root back to canonical form.
///
/// Returns `None` if the path contains anything other than normal components
/// or is not valid UTF-8.
pub fn from_native(relative: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => segments.push(name.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Every proper ancestor of a canonical path, shortest first.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(idx, _)| &path[..idx])
}

fn has_volume_marker(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or("");
    first.contains(':')
}
