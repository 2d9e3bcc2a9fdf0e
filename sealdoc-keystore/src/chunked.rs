//! Two-part storage for secrets larger than one platform item.
//!
//! Platform keychains cap item size below what an exported RSA private key
//! needs. A value over the ceiling is split at the midpoint into `<key>_0`
//! and `<key>_1`. A value is only ever read back whole: if either part is
//! missing or empty the chunked form is treated as absent.

use crate::error::{KeystoreError, KeystoreResult};
use crate::store::SecretStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-item ceiling of the most restrictive supported platform store.
///
/// An exported RSA-2048 private key (about 1.6 KB of base64) is always over
/// this limit and is stored as two chunks.
pub const DEFAULT_ITEM_LIMIT: usize = 1536;

/// Stores long secrets across at most two items of a [`SecretStore`].
#[derive(Clone)]
pub struct ChunkedSecretStore {
    inner: Arc<dyn SecretStore>,
    item_limit: usize,
}

impl ChunkedSecretStore {
    pub fn new(inner: Arc<dyn SecretStore>) -> Self {
        Self::with_item_limit(inner, DEFAULT_ITEM_LIMIT)
    }

    pub fn with_item_limit(inner: Arc<dyn SecretStore>, item_limit: usize) -> Self {
        Self { inner, item_limit }
    }

    /// Largest value [`store`](Self::store) accepts.
    pub fn capacity(&self) -> usize {
        self.item_limit.saturating_mul(2)
    }

    /// Stores `value`, splitting it when it exceeds one item.
    pub async fn store(&self, key: &str, value: &str) -> KeystoreResult<()> {
        if value.len() <= self.item_limit {
            self.inner.set_item(key, value).await?;
            self.remove_chunks(key).await?;
            debug!("stored secret {key} as a single item");
            return Ok(());
        }

        let (first, second) = split_midpoint(value);
        if first.len() > self.item_limit || second.len() > self.item_limit {
            return Err(KeystoreError::SizeExceeded {
                len: value.len(),
                max: self.capacity(),
            });
        }

        let (first_key, second_key) = chunk_keys(key);
        self.inner.set_item(&first_key, first).await?;
        if let Err(e) = self.inner.set_item(&second_key, second).await {
            warn!("second chunk of {key} failed to store, rolling back first chunk");
            if let Err(cleanup) = self.inner.delete_item(&first_key).await {
                warn!("rollback of {first_key} failed: {cleanup}");
            }
            return Err(e);
        }

        self.inner.delete_item(key).await?;
        debug!("stored secret {key} as two chunks");
        Ok(())
    }

    /// Reads a value back. Never returns a partial value.
    pub async fn load(&self, key: &str) -> KeystoreResult<Option<String>> {
        let (first_key, second_key) = chunk_keys(key);
        let first = self.inner.get_item(&first_key).await?;
        let second = self.inner.get_item(&second_key).await?;

        match (first, second) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => return Ok(Some(a + &b)),
            (Some(_), None) | (None, Some(_)) => {
                debug!("secret {key} has only one chunk, ignoring it");
            }
            _ => {}
        }

        self.inner.get_item(key).await
    }

    /// Like [`load`](Self::load), but absence is an error.
    pub async fn load_required(&self, key: &str) -> KeystoreResult<String> {
        self.load(key)
            .await?
            .ok_or_else(|| KeystoreError::SecretMissing(key.to_string()))
    }

    /// Removes both chunks and any single-item form.
    pub async fn delete(&self, key: &str) -> KeystoreResult<()> {
        self.remove_chunks(key).await?;
        self.inner.delete_item(key).await
    }

    async fn remove_chunks(&self, key: &str) -> KeystoreResult<()> {
        let (first_key, second_key) = chunk_keys(key);
        self.inner.delete_item(&first_key).await?;
        self.inner.delete_item(&second_key).await
    }
}

fn chunk_keys(key: &str) -> (String, String) {
    (format!("{key}_0"), format!("{key}_1"))
}

/// Splits at `floor(len / 2)`, moved back to the nearest char boundary.
fn split_midpoint(value: &str) -> (&str, &str) {
    let mut mid = value.len() / 2;
    while !value.is_char_boundary(mid) {
        mid -= 1;
    }
    value.split_at(mid)
}
