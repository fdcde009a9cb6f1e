//! Slash-delimited drive paths. The root is the empty string.

use crate::error::DriveError;

/// Placeholder blob that keeps an otherwise empty folder listable
pub const SENTINEL_NAME: &str = ".gitkeep";

/// Drop leading, trailing and repeated slashes.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    let name = name.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent directory, "" for top-level entries.
pub fn parent_of(path: &str) -> &str {
    let path = path.trim_matches('/');
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

pub fn name_of(path: &str) -> &str {
    let path = path.trim_matches('/');
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

pub fn is_sentinel(path: &str) -> bool {
    name_of(path) == SENTINEL_NAME
}

/// True when `path` is `prefix` itself or lies beneath it.
pub fn is_within(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// Check a single path segment supplied by a user.
pub fn validate_name(name: &str) -> Result<(), DriveError> {
    let reason = if name.trim().is_empty() {
        "name is empty"
    } else if name.contains('/') {
        "name contains '/'"
    } else if name == "." || name == ".." {
        "name is a relative path component"
    } else if name == SENTINEL_NAME {
        "name is reserved for folder markers"
    } else {
        return Ok(());
    };
    Err(DriveError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Check every segment of a user supplied path.
pub fn validate_path(path: &str) -> Result<String, DriveError> {
    let normalized = normalize(path);
    if normalized.is_empty() {
        return Err(DriveError::InvalidName {
            name: path.to_string(),
            reason: "path is empty",
        });
    }
    for segment in normalized.split('/') {
        validate_name(segment)?;
    }
    Ok(normalized)
}
