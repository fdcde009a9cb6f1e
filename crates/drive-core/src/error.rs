use drive_platform::StoreError;
use thiserror::Error;

/// Failures surfaced to callers of the drive.
///
/// Anything that concerns a particular entry names its path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriveError {
    #[error("not found: {path}")]
    NotFound { path: String },
    #[error("{path} changed since it was read (stale content id)")]
    Conflict { path: String },
    #[error("{path} is too large: {size} bytes (max {max})")]
    TooLarge { path: String, size: u64, max: u64 },
    #[error("already exists: {path}")]
    AlreadyExists { path: String },
    #[error("selection of {count} entries exceeds the limit of {max}")]
    SelectionTooLarge { count: usize, max: usize },
    #[error("backend unavailable for {path}: {reason}")]
    BackendUnavailable { path: String, reason: String },
    #[error("authentication required")]
    AuthRequired,
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("is a directory: {path}")]
    IsADirectory { path: String },
    #[error("not a directory: {path}")]
    NotADirectory { path: String },
}

impl DriveError {
    /// The path this failure concerns, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            DriveError::NotFound { path }
            | DriveError::Conflict { path }
            | DriveError::TooLarge { path, .. }
            | DriveError::AlreadyExists { path }
            | DriveError::BackendUnavailable { path, .. }
            | DriveError::IsADirectory { path }
            | DriveError::NotADirectory { path } => Some(path),
            DriveError::InvalidName { name, .. } => Some(name),
            DriveError::SelectionTooLarge { .. } | DriveError::AuthRequired => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DriveError::NotFound { .. })
    }
}

impl From<StoreError> for DriveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { path } => DriveError::NotFound { path },
            StoreError::Conflict { path } => DriveError::Conflict { path },
            StoreError::TooLarge { path, size, max } => DriveError::TooLarge { path, size, max },
            StoreError::NotADirectory { path } => DriveError::NotADirectory { path },
            StoreError::AuthRequired => DriveError::AuthRequired,
            StoreError::Unavailable { path, reason } => {
                DriveError::BackendUnavailable { path, reason }
            }
        }
    }
}
