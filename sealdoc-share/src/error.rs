//! Share orchestration error types.

use sealdoc_crypto::CryptoError;
use sealdoc_keystore::KeystoreError;
use thiserror::Error;

/// Result type for share operations.
pub type ShareResult<T> = Result<T, ShareError>;

/// Errors surfaced by the share workflow.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("no key pair set up for {0}")]
    KeySetupRequired(String),

    #[error("content key could not be unwrapped for {0}")]
    UnwrapFailed(String),

    #[error("document could not be decrypted")]
    DecryptionFailed,

    #[error("document is {size} bytes, limit is {max}")]
    StorageSizeExceeded { size: u64, max: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ShareError {
    /// Whether retrying the same call can succeed. Unwrap and decrypt
    /// failures are structural; retrying them only repeats the failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::KeyGeneration(_)
                | Self::Backend(_)
                | Self::Crypto(CryptoError::KeyGeneration(_))
                | Self::Keystore(KeystoreError::Backend(_))
        )
    }

    /// Whether the caller should route the user to key setup.
    pub fn requires_key_setup(&self) -> bool {
        matches!(
            self,
            Self::KeySetupRequired(_)
                | Self::UnwrapFailed(_)
                | Self::Keystore(KeystoreError::SecretMissing(_))
        )
    }

    /// Message safe to show to an end user. Never includes crypto detail.
    pub fn user_message(&self) -> String {
        match self {
            Self::KeyGeneration(_) | Self::Crypto(CryptoError::KeyGeneration(_)) => {
                "Secure key setup failed. You can retry now, or skip; \
                 skipping means you can't receive shared documents yet."
                    .to_string()
            }
            Self::KeySetupRequired(_) | Self::Keystore(KeystoreError::SecretMissing(_)) => {
                "Finish secure key setup on this device to open shared documents.".to_string()
            }
            Self::UnwrapFailed(_) | Self::DecryptionFailed | Self::Crypto(_) => {
                "Cannot open this document.".to_string()
            }
            Self::StorageSizeExceeded { max, .. } => {
                format!("This file is too large to protect (limit {} MB).", max / (1024 * 1024))
            }
            Self::NotFound(_) => "This document is no longer available.".to_string(),
            Self::Backend(_) | Self::Keystore(_) | Self::Serialization(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            Self::Config(_) => "The app is misconfigured.".to_string(),
        }
    }
}
