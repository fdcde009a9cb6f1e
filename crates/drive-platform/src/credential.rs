use crate::error::StoreError;

/// Supplies the bearer credential attached to every backend call.
///
/// Acquisition and refresh live outside the drive; callers only ever ask for
/// the current value.
pub trait CredentialSource: Send + Sync {
    fn credential(&self) -> Result<String, StoreError>;
}

/// A fixed token, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: Option<String>) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        Self { token }
    }
}

impl CredentialSource for StaticCredential {
    fn credential(&self) -> Result<String, StoreError> {
        self.token.clone().ok_or(StoreError::AuthRequired)
    }
}
