/// Error types for Reels Service
///
/// Every failure a caller can observe is mapped onto one of the categories
/// below. Reads surface as an empty state with a message, writes and uploads
/// surface as a transient status notice, auth failures carry a user-facing
/// category. Nothing here is retried automatically.
use crate::auth::AuthError;
use crate::store::StoreError;
use thiserror::Error;

/// Result type for reels-service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Query or fetch against the document store failed
    #[error("Read error: {0}")]
    Read(String),

    /// Post, comment or saved-mark creation failed
    #[error("Write error: {0}")]
    Write(String),

    /// Media upload rejected by the provider
    #[error("Upload error: {0}")]
    Upload(String),

    /// Identity service failure
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Input rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation requires a signed-in viewer
    #[error("Not signed in")]
    Unauthenticated,

    /// Same operation already in flight
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Wrap a store failure that happened while reading
    pub fn read(err: StoreError) -> Self {
        AppError::Read(err.to_string())
    }

    /// Wrap a store failure that happened while writing
    pub fn write(err: StoreError) -> Self {
        AppError::Write(err.to_string())
    }

    /// Short message suitable for a status notice or an empty-state banner
    pub fn user_message(&self) -> String {
        match self {
            AppError::Read(msg) => format!("Failed to load: {}", msg),
            AppError::Write(msg) => format!("Failed to save: {}", msg),
            AppError::Upload(msg) => format!("Upload failed: {}", msg),
            AppError::Auth(err) => err.user_message().to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(_) => "The requested reel no longer exists.".to_string(),
            AppError::Unauthenticated => "Please sign in first.".to_string(),
            AppError::Conflict(_) => "Please wait, the previous action is still running.".to_string(),
            AppError::Config(msg) => format!("Misconfigured client: {}", msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
