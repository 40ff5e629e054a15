use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure taxonomy of the persistence layer. Nothing here is process-fatal;
/// every variant is reported back to the caller as a structured result.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required field was missing or empty
    #[error("validation failed: {0}")]
    Validation(&'static str),

    /// The requested thread or entity does not exist. Reportable, not a defect.
    #[error("not found: {0}")]
    NotFound(String),

    /// Ciphertext was malformed or encrypted under a different key. No
    /// automatic recovery or key-rotation fallback is attempted.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The underlying store rejected the operation or is unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
