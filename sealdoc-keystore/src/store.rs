//! Secret store backends.
//!
//! A [`SecretStore`] holds small string items keyed by name. Each call is
//! all-or-nothing; callers that need larger values go through
//! [`ChunkedSecretStore`](crate::ChunkedSecretStore).

use crate::error::{KeystoreError, KeystoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Platform secure storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn set_item(&self, key: &str, value: &str) -> KeystoreResult<()>;

    /// Returns `None` when no item is stored under `key`.
    async fn get_item(&self, key: &str) -> KeystoreResult<Option<String>>;

    /// Deleting a missing item is not an error.
    async fn delete_item(&self, key: &str) -> KeystoreResult<()>;
}

#[async_trait]
impl<S: SecretStore + ?Sized> SecretStore for Arc<S> {
    async fn set_item(&self, key: &str, value: &str) -> KeystoreResult<()> {
        (**self).set_item(key, value).await
    }

    async fn get_item(&self, key: &str) -> KeystoreResult<Option<String>> {
        (**self).get_item(key).await
    }

    async fn delete_item(&self, key: &str) -> KeystoreResult<()> {
        (**self).delete_item(key).await
    }
}

/// In-process store, optionally enforcing a per-item size ceiling like the
/// platform stores do.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    items: Arc<RwLock<HashMap<String, String>>>,
    item_limit: Option<usize>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects any item longer than `limit` bytes.
    pub fn with_item_limit(limit: usize) -> Self {
        Self {
            items: Arc::default(),
            item_limit: Some(limit),
        }
    }

    /// Stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn set_item(&self, key: &str, value: &str) -> KeystoreResult<()> {
        if let Some(limit) = self.item_limit {
            if value.len() > limit {
                return Err(KeystoreError::Backend(format!(
                    "item {key} is {} bytes, store limit is {limit}",
                    value.len()
                )));
            }
        }
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_item(&self, key: &str) -> KeystoreResult<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn delete_item(&self, key: &str) -> KeystoreResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

#[cfg(feature = "platform-keyring")]
pub use keyring_store::KeyringSecretStore;

#[cfg(feature = "platform-keyring")]
mod keyring_store {
    use super::SecretStore;
    use crate::error::{KeystoreError, KeystoreResult};
    use async_trait::async_trait;
    use keyring::Entry;

    /// OS keychain through the `keyring` crate. Every item is a separate
    /// entry under one service name.
    #[derive(Clone, Debug)]
    pub struct KeyringSecretStore {
        service: String,
    }

    impl KeyringSecretStore {
        pub fn new(service: impl Into<String>) -> Self {
            Self {
                service: service.into(),
            }
        }

        async fn with_entry<T, F>(&self, key: &str, op: F) -> KeystoreResult<T>
        where
            T: Send + 'static,
            F: FnOnce(Entry) -> KeystoreResult<T> + Send + 'static,
        {
            let service = self.service.clone();
            let key = key.to_string();
            tokio::task::spawn_blocking(move || {
                let entry = Entry::new(&service, &key)
                    .map_err(|e| KeystoreError::Backend(format!("keyring init: {e}")))?;
                op(entry)
            })
            .await
            .map_err(|e| KeystoreError::Backend(format!("keyring task failed: {e}")))?
        }
    }

    #[async_trait]
    impl SecretStore for KeyringSecretStore {
        async fn set_item(&self, key: &str, value: &str) -> KeystoreResult<()> {
            let value = value.to_string();
            self.with_entry(key, move |entry| {
                entry
                    .set_password(&value)
                    .map_err(|e| KeystoreError::Backend(format!("store item: {e}")))
            })
            .await
        }

        async fn get_item(&self, key: &str) -> KeystoreResult<Option<String>> {
            self.with_entry(key, |entry| match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(KeystoreError::Backend(format!("load item: {e}"))),
            })
            .await
        }

        async fn delete_item(&self, key: &str) -> KeystoreResult<()> {
            self.with_entry(key, |entry| match entry.delete_password() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(KeystoreError::Backend(format!("delete item: {e}"))),
            })
            .await
        }
    }
}
