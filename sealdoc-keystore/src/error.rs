//! Keystore error types.

use thiserror::Error;

/// Result type for keystore operations.
pub type KeystoreResult<T> = Result<T, KeystoreError>;

/// Errors from secret storage.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("secret not found: {0}")]
    SecretMissing(String),

    #[error("secret of {len} bytes exceeds the {max}-byte chunked capacity")]
    SizeExceeded { len: usize, max: usize },

    #[error("secret store backend error: {0}")]
    Backend(String),
}
