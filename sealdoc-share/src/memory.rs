//! In-process implementations of the collaborator traits.
//!
//! Used by tests and by embedders that keep everything local.

use crate::backend::{
    DeviceFingerprint, DocumentBackend, ForensicIndex, ProfileDirectory, SecurityEventSink,
};
use crate::error::ShareResult;
use crate::types::{ForensicRecord, SecurityEvent, WrappedKey};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Blobs and wrapped-key rows held in memory.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    wrapped: Arc<RwLock<HashMap<(String, String), WrappedKey>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holders with a wrapped key for `document_id`, sorted.
    pub async fn holders(&self, document_id: &str) -> Vec<String> {
        let mut holders: Vec<String> = self
            .wrapped
            .read()
            .await
            .keys()
            .filter(|(doc, _)| doc == document_id)
            .map(|(_, holder)| holder.clone())
            .collect();
        holders.sort();
        holders
    }

    /// Overwrites a stored blob, for tamper tests.
    pub async fn replace_blob(&self, document_id: &str, blob: Vec<u8>) {
        self.blobs.write().await.insert(document_id.to_string(), blob);
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn put_blob(&self, document_id: &str, blob: Vec<u8>) -> ShareResult<()> {
        self.blobs.write().await.insert(document_id.to_string(), blob);
        Ok(())
    }

    async fn get_blob(&self, document_id: &str) -> ShareResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(document_id).cloned())
    }

    async fn put_wrapped_key(&self, row: WrappedKey) -> ShareResult<()> {
        let key = (row.document_id.clone(), row.holder_id.clone());
        self.wrapped.write().await.insert(key, row);
        Ok(())
    }

    async fn get_wrapped_key(
        &self,
        document_id: &str,
        holder_id: &str,
    ) -> ShareResult<Option<WrappedKey>> {
        let key = (document_id.to_string(), holder_id.to_string());
        Ok(self.wrapped.read().await.get(&key).cloned())
    }

    async fn delete_wrapped_key(&self, document_id: &str, holder_id: &str) -> ShareResult<bool> {
        let key = (document_id.to_string(), holder_id.to_string());
        Ok(self.wrapped.write().await.remove(&key).is_some())
    }
}

/// Public keys held in memory.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    keys: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileDirectory for MemoryDirectory {
    async fn public_key(&self, holder_id: &str) -> ShareResult<Option<String>> {
        Ok(self.keys.read().await.get(holder_id).cloned())
    }

    async fn publish_public_key(&self, holder_id: &str, public_key: &str) -> ShareResult<()> {
        self.keys
            .write()
            .await
            .insert(holder_id.to_string(), public_key.to_string());
        Ok(())
    }
}

/// A fixed device hash.
#[derive(Clone, Debug)]
pub struct StaticFingerprint(pub String);

impl DeviceFingerprint for StaticFingerprint {
    fn device_hash(&self) -> String {
        self.0.clone()
    }
}

#[derive(Clone, Default)]
pub struct MemoryForensicIndex {
    records: Arc<RwLock<HashMap<String, ForensicRecord>>>,
}

impl MemoryForensicIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ForensicIndex for MemoryForensicIndex {
    async fn record(&self, watermark_hash: &str, record: ForensicRecord) -> ShareResult<()> {
        self.records
            .write()
            .await
            .insert(watermark_hash.to_string(), record);
        Ok(())
    }

    async fn lookup(&self, watermark_hash: &str) -> ShareResult<Option<ForensicRecord>> {
        Ok(self.records.read().await.get(watermark_hash).cloned())
    }
}

/// Collects every emitted event.
#[derive(Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<RwLock<Vec<SecurityEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl SecurityEventSink for RecordingEventSink {
    async fn emit(&self, event: SecurityEvent) {
        self.events.write().await.push(event);
    }
}
