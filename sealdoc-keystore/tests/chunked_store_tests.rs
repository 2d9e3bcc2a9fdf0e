//! Chunked storage against the in-memory store.
//!
//! Covers split/reassembly, absence semantics for partial writes, stale
//! chunk cleanup and rollback when the second write fails.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sealdoc_keystore::{
    ChunkedSecretStore, DEFAULT_ITEM_LIMIT, KeystoreError, KeystoreResult, MemorySecretStore,
    SecretStore,
};
use std::sync::Arc;

fn chunked(limit: usize) -> (MemorySecretStore, ChunkedSecretStore) {
    let memory = MemorySecretStore::with_item_limit(limit);
    let store = ChunkedSecretStore::with_item_limit(Arc::new(memory.clone()), limit);
    (memory, store)
}

/// Rejects writes to the second chunk of any key.
struct FailingSecondChunk(MemorySecretStore);

#[async_trait]
impl SecretStore for FailingSecondChunk {
    async fn set_item(&self, key: &str, value: &str) -> KeystoreResult<()> {
        if key.ends_with("_1") {
            return Err(KeystoreError::Backend("disk full".into()));
        }
        self.0.set_item(key, value).await
    }

    async fn get_item(&self, key: &str) -> KeystoreResult<Option<String>> {
        self.0.get_item(key).await
    }

    async fn delete_item(&self, key: &str) -> KeystoreResult<()> {
        self.0.delete_item(key).await
    }
}

#[tokio::test]
async fn three_thousand_chars_roundtrip_in_two_chunks() {
    let (memory, store) = chunked(DEFAULT_ITEM_LIMIT);
    let value: String = (0..3000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();

    store.store("private_key", &value).await.unwrap();

    assert_eq!(memory.keys().await, vec!["private_key_0", "private_key_1"]);
    assert_eq!(
        memory.get_item("private_key_0").await.unwrap().unwrap().len(),
        1500
    );
    assert_eq!(store.load("private_key").await.unwrap(), Some(value));
}

#[tokio::test]
async fn key_sized_secret_is_chunked_under_default_limit() {
    let (memory, store) = chunked(DEFAULT_ITEM_LIMIT);
    // Length of a base64 PKCS#8 RSA-2048 private key.
    let value = "k".repeat(1624);

    store.store("identity", &value).await.unwrap();

    assert_eq!(memory.keys().await, vec!["identity_0", "identity_1"]);
    assert_eq!(store.load("identity").await.unwrap(), Some(value));
}

#[tokio::test]
async fn single_chunk_present_loads_none() {
    let memory = MemorySecretStore::new();
    memory.set_item("k_0", "first half only").await.unwrap();
    let store = ChunkedSecretStore::new(Arc::new(memory.clone()));

    assert_eq!(store.load("k").await.unwrap(), None);

    memory.delete_item("k_0").await.unwrap();
    memory.set_item("k_1", "second half only").await.unwrap();
    assert_eq!(store.load("k").await.unwrap(), None);
}

#[tokio::test]
async fn empty_chunk_counts_as_absent() {
    let memory = MemorySecretStore::new();
    memory.set_item("k_0", "abc").await.unwrap();
    memory.set_item("k_1", "").await.unwrap();
    let store = ChunkedSecretStore::new(Arc::new(memory));

    assert_eq!(store.load("k").await.unwrap(), None);
}

#[tokio::test]
async fn legacy_single_item_is_read() {
    let memory = MemorySecretStore::new();
    memory.set_item("k", "stored before chunking").await.unwrap();
    let store = ChunkedSecretStore::new(Arc::new(memory));

    assert_eq!(
        store.load("k").await.unwrap().as_deref(),
        Some("stored before chunking")
    );
}

#[tokio::test]
async fn rewrites_clean_up_the_other_form() {
    let (memory, store) = chunked(16);

    store.store("k", "short").await.unwrap();
    assert_eq!(memory.keys().await, vec!["k"]);

    store.store("k", "a value longer than sixteen").await.unwrap();
    assert_eq!(memory.keys().await, vec!["k_0", "k_1"]);

    store.store("k", "short again").await.unwrap();
    assert_eq!(memory.keys().await, vec!["k"]);
    assert_eq!(store.load("k").await.unwrap().as_deref(), Some("short again"));
}

#[tokio::test]
async fn oversized_value_is_rejected() {
    let (memory, store) = chunked(8);
    let err = store.store("k", &"x".repeat(17)).await.unwrap_err();

    assert!(matches!(err, KeystoreError::SizeExceeded { len: 17, max: 16 }));
    assert!(memory.is_empty().await);
}

#[tokio::test]
async fn failed_second_chunk_rolls_back_first() {
    let memory = MemorySecretStore::new();
    let store = ChunkedSecretStore::with_item_limit(
        Arc::new(FailingSecondChunk(memory.clone())),
        8,
    );

    let err = store.store("k", "sixteen-chars!!!").await.unwrap_err();
    assert!(matches!(err, KeystoreError::Backend(_)));
    assert!(memory.is_empty().await);
    assert_eq!(store.load("k").await.unwrap(), None);
}

#[tokio::test]
async fn load_required_and_delete() {
    let (memory, store) = chunked(8);
    store.store("k", "0123456789abcdef").await.unwrap();
    assert_eq!(store.load_required("k").await.unwrap(), "0123456789abcdef");

    store.delete("k").await.unwrap();
    assert!(memory.is_empty().await);
    assert!(matches!(
        store.load_required("k").await,
        Err(KeystoreError::SecretMissing(key)) if key == "k"
    ));
}

proptest! {
    #[test]
    fn any_value_within_capacity_roundtrips(value in "\\PC{0,64}") {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (_, store) = chunked(40);
        let (stored, loaded) = rt.block_on(async {
            let stored = store.store("k", &value).await;
            (stored, store.load("k").await.unwrap())
        });

        match stored {
            Ok(()) => prop_assert_eq!(loaded, Some(value)),
            Err(KeystoreError::SizeExceeded { .. }) => prop_assert_eq!(loaded, None),
            Err(e) => return Err(TestCaseError::fail(format!("unexpected error {e}"))),
        }
    }
}
