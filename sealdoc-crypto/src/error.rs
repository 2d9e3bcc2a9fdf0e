//! Error types for the crypto layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in key handling, encryption and watermarking.
///
/// A watermark signature mismatch is not an error: verification
/// reports it as a [`crate::Verification`] result instead.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid key format: {0}")]
    KeyFormat(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("key unwrap failed: {0}")]
    Unwrap(String),

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid watermark payload: {0}")]
    InvalidPayload(String),

    #[error("watermark embedding failed: {0}")]
    Embedding(String),
}
