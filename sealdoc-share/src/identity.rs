//! Per-identity RSA key pair lifecycle.
//!
//! The private half lives in the device secret store (chunked); the public
//! half is published to the profile directory. Every operation on one
//! identity runs under that identity's lock, so regeneration never
//! interleaves with a read and nobody sees one half of an old pair next to
//! one half of a new one.

use crate::backend::{ProfileDirectory, SecurityEventSink};
use crate::config::ShareConfig;
use crate::error::{ShareError, ShareResult};
use crate::types::SecurityEvent;
use sealdoc_crypto::{KeyMaterial, KeyPair, PrivateKey, PublicKey, generate_keypair};
use sealdoc_keystore::ChunkedSecretStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Owns key pair generation, storage and publication for local identities.
pub struct IdentityKeyManager {
    secrets: ChunkedSecretStore,
    directory: Arc<dyn ProfileDirectory>,
    events: Arc<dyn SecurityEventSink>,
    config: ShareConfig,
    locks: IdentityLocks,
}

impl IdentityKeyManager {
    pub fn new(
        secrets: ChunkedSecretStore,
        directory: Arc<dyn ProfileDirectory>,
        events: Arc<dyn SecurityEventSink>,
        config: &ShareConfig,
    ) -> Self {
        Self {
            secrets,
            directory,
            events,
            config: config.clone(),
            locks: IdentityLocks::default(),
        }
    }

    /// Returns the identity's public key, generating and publishing a key
    /// pair on first use. Safe to retry after any failure: the private key
    /// is stored before the public key is published, and a stored key is
    /// reused on the next call.
    pub async fn ensure_keypair(&self, identity: &str) -> ShareResult<PublicKey> {
        let _guard = self.locks.acquire(identity).await;

        if let Some(private) = self.load_private(identity).await? {
            let public = KeyPair::from_private(private).public;
            self.publish_if_missing(identity, &public).await?;
            return Ok(public);
        }

        info!("no key pair for {identity}, generating");
        let pair = generate_off_thread().await?;
        self.persist(identity, &pair).await?;
        Ok(pair.public)
    }

    /// Replaces the identity's key pair. Existing wrapped keys for the old
    /// public key become unreadable; owners must re-share.
    pub async fn regenerate(&self, identity: &str) -> ShareResult<PublicKey> {
        let _guard = self.locks.acquire(identity).await;

        let pair = generate_off_thread().await?;
        self.persist(identity, &pair).await?;
        info!("regenerated key pair for {identity}");
        self.events
            .emit(SecurityEvent::KeyPairRegenerated {
                identity: identity.to_string(),
                at: chrono::Utc::now(),
            })
            .await;
        Ok(pair.public)
    }

    /// Installs an existing key pair, e.g. one restored from backup.
    pub async fn install(&self, identity: &str, pair: &KeyPair) -> ShareResult<()> {
        let _guard = self.locks.acquire(identity).await;
        self.persist(identity, pair).await
    }

    /// The identity's private key. Fails with
    /// [`ShareError::KeySetupRequired`] when none is stored.
    pub async fn private_key(&self, identity: &str) -> ShareResult<PrivateKey> {
        let _guard = self.locks.acquire(identity).await;
        self.load_private(identity)
            .await?
            .ok_or_else(|| ShareError::KeySetupRequired(identity.to_string()))
    }

    /// The published public key of any holder, or `None` if they have not
    /// completed setup.
    pub async fn public_key(&self, holder_id: &str) -> ShareResult<Option<PublicKey>> {
        match self.directory.public_key(holder_id).await? {
            Some(encoded) => Ok(Some(PublicKey::import(&encoded)?)),
            None => Ok(None),
        }
    }

    /// Whether a private key is stored locally for `identity`.
    pub async fn has_keypair(&self, identity: &str) -> ShareResult<bool> {
        match self.private_key(identity).await {
            Ok(_) => Ok(true),
            Err(ShareError::KeySetupRequired(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn slot(&self, identity: &str) -> String {
        self.config.private_key_slot(identity)
    }

    async fn load_private(&self, identity: &str) -> ShareResult<Option<PrivateKey>> {
        let Some(encoded) = self.secrets.load(&self.slot(identity)).await? else {
            return Ok(None);
        };
        let encoded = Zeroizing::new(encoded);
        Ok(Some(PrivateKey::import(&encoded)?))
    }

    async fn persist(&self, identity: &str, pair: &KeyPair) -> ShareResult<()> {
        let private = Zeroizing::new(pair.private.export()?);
        self.secrets.store(&self.slot(identity), &private).await?;

        let public = pair.public.export()?;
        self.directory
            .publish_public_key(identity, &public)
            .await
            .inspect_err(|e| warn!("publishing public key for {identity} failed: {e}"))?;
        debug!("stored and published key pair for {identity}");
        Ok(())
    }

    async fn publish_if_missing(&self, identity: &str, public: &PublicKey) -> ShareResult<()> {
        let published = self.directory.public_key(identity).await?;
        let current = public.export()?;
        if published.as_deref() != Some(current.as_str()) {
            debug!("republishing public key for {identity}");
            self.directory.publish_public_key(identity, &current).await?;
        }
        Ok(())
    }
}

/// One async lock per identity. Entries live only while a caller holds or
/// waits on them.
#[derive(Default)]
struct IdentityLocks {
    map: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    async fn acquire(&self, identity: &str) -> IdentityGuard<'_> {
        let lock = {
            let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(identity.to_string()).or_default())
        };
        IdentityGuard {
            locks: self,
            identity: identity.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn release(&self, identity: &str) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        // The map's own reference is the last one: nobody holds or awaits it.
        if map.get(identity).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(identity);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    identity: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.identity);
    }
}

/// RSA-2048 generation is CPU-bound for long enough to stall an executor
/// thread; yield first, then run it on the blocking pool.
async fn generate_off_thread() -> ShareResult<KeyPair> {
    tokio::task::yield_now().await;
    tokio::task::spawn_blocking(generate_keypair)
        .await
        .map_err(|e| ShareError::KeyGeneration(format!("generation task failed: {e}")))?
        .map_err(|e| ShareError::KeyGeneration(e.to_string()))
}
