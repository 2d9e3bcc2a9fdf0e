//! Collaborator interfaces the share workflow calls out to.
//!
//! Persistence, the profile directory and audit delivery live outside this
//! crate. Implementations report backend faults as
//! [`ShareError::Backend`](crate::ShareError::Backend); "not found" answers
//! are `None`, not errors.

use crate::error::ShareResult;
use crate::types::{ForensicRecord, SecurityEvent, WrappedKey};
use async_trait::async_trait;

/// Ciphertext and wrapped-key storage.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn put_blob(&self, document_id: &str, blob: Vec<u8>) -> ShareResult<()>;

    async fn get_blob(&self, document_id: &str) -> ShareResult<Option<Vec<u8>>>;

    async fn put_wrapped_key(&self, row: WrappedKey) -> ShareResult<()>;

    async fn get_wrapped_key(
        &self,
        document_id: &str,
        holder_id: &str,
    ) -> ShareResult<Option<WrappedKey>>;

    /// Returns whether a row was removed.
    async fn delete_wrapped_key(&self, document_id: &str, holder_id: &str) -> ShareResult<bool>;
}

/// Public key lookup by identity.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Exported public key, or `None` if the holder never set one up.
    async fn public_key(&self, holder_id: &str) -> ShareResult<Option<String>>;

    async fn publish_public_key(&self, holder_id: &str, public_key: &str) -> ShareResult<()>;
}

/// Opaque per-device identifier bound into watermarks.
pub trait DeviceFingerprint: Send + Sync {
    fn device_hash(&self) -> String;
}

/// Server-side map from watermark hash to the copy it was issued for.
#[async_trait]
pub trait ForensicIndex: Send + Sync {
    async fn record(&self, watermark_hash: &str, record: ForensicRecord) -> ShareResult<()>;

    async fn lookup(&self, watermark_hash: &str) -> ShareResult<Option<ForensicRecord>>;
}

/// Receives security events. Delivery is best-effort.
#[async_trait]
pub trait SecurityEventSink: Send + Sync {
    async fn emit(&self, event: SecurityEvent);
}
