use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {path}")]
    NotFound { path: String },
    #[error("content id precondition failed: {path}")]
    Conflict { path: String },
    #[error("blob too large: {path} ({size} bytes, max {max})")]
    TooLarge { path: String, size: u64, max: u64 },
    #[error("not a directory: {path}")]
    NotADirectory { path: String },
    #[error("authentication required")]
    AuthRequired,
    #[error("backend unavailable for {path}: {reason}")]
    Unavailable { path: String, reason: String },
}

impl StoreError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn conflict(path: impl Into<String>) -> Self {
        Self::Conflict { path: path.into() }
    }

    pub fn unavailable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
