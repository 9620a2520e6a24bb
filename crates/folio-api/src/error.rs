//! Store error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FolioError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User profile not found")]
    ProfileNotFound,

    #[error("No user logged in")]
    NotAuthenticated,

    #[error("You cannot message yourself")]
    CannotContactSelf,

    #[error("Providers can only contact seekers")]
    ProvidersContactSeekersOnly,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<serde_json::Error> for FolioError {
    fn from(e: serde_json::Error) -> Self {
        FolioError::Storage(e.into())
    }
}

pub type FolioResult<T> = Result<T, FolioError>;
