//! Share workflow configuration.

use crate::error::{ShareError, ShareResult};
use serde::{Deserialize, Serialize};

/// Configuration for [`SharingOrchestrator`](crate::SharingOrchestrator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Upper bound on concurrently running per-recipient wraps.
    pub max_concurrent_wraps: usize,

    /// Largest plaintext accepted by `protect`, in bytes.
    pub max_document_bytes: u64,

    /// Per-item ceiling of the platform secret store.
    pub secret_item_limit: usize,

    /// Secret store key prefix; the identity id is appended.
    pub private_key_slot_prefix: String,

    /// Embed a signed watermark before encrypting.
    pub watermark_enabled: bool,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            max_concurrent_wraps: 4,
            max_document_bytes: 50 * 1024 * 1024, // 50 MiB
            secret_item_limit: sealdoc_keystore::DEFAULT_ITEM_LIMIT,
            private_key_slot_prefix: "sealdoc_private_key".to_string(),
            watermark_enabled: true,
        }
    }
}

impl ShareConfig {
    pub fn validate(&self) -> ShareResult<()> {
        if self.max_concurrent_wraps == 0 {
            return Err(ShareError::Config("max_concurrent_wraps must be at least 1".into()));
        }
        if self.max_document_bytes == 0 {
            return Err(ShareError::Config("max_document_bytes must be positive".into()));
        }
        // An exported RSA-2048 private key is ~1.6 KB of base64; two items
        // must hold it.
        if self.secret_item_limit < 1024 {
            return Err(ShareError::Config(format!(
                "secret_item_limit {} is too small to hold a private key in two items",
                self.secret_item_limit
            )));
        }
        if self.private_key_slot_prefix.trim().is_empty() {
            return Err(ShareError::Config("private_key_slot_prefix is empty".into()));
        }
        Ok(())
    }

    /// Secret store key holding `identity`'s private key.
    pub fn private_key_slot(&self, identity: &str) -> String {
        format!("{}_{identity}", self.private_key_slot_prefix)
    }
}
