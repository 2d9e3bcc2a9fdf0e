//! Protect, share, revoke and open workflows.
//!
//! Coordinates the crypto primitives with the storage backend, profile
//! directory and secret store. RSA work runs on the blocking pool; content
//! keys never leave this process unwrapped.

use crate::backend::{
    DeviceFingerprint, DocumentBackend, ForensicIndex, ProfileDirectory, SecurityEventSink,
};
use crate::config::ShareConfig;
use crate::error::{ShareError, ShareResult};
use crate::identity::IdentityKeyManager;
use crate::types::*;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sealdoc_crypto::{
    Capabilities, ContentKey, ContentKind, PrivateKey, PublicKey, WatermarkCodec,
    build_signed_payload, decrypt_bytes, encrypt, generate_watermark_hash, unwrap_key, verify,
    wrap_key,
};
use sealdoc_keystore::{ChunkedSecretStore, SecretStore};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// External services the orchestrator depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn DocumentBackend>,
    pub directory: Arc<dyn ProfileDirectory>,
    pub secrets: Arc<dyn SecretStore>,
    pub fingerprint: Arc<dyn DeviceFingerprint>,
    pub forensics: Arc<dyn ForensicIndex>,
    pub events: Arc<dyn SecurityEventSink>,
}

/// Runs document protection workflows for local identities.
pub struct SharingOrchestrator {
    config: ShareConfig,
    backend: Arc<dyn DocumentBackend>,
    directory: Arc<dyn ProfileDirectory>,
    fingerprint: Arc<dyn DeviceFingerprint>,
    forensics: Arc<dyn ForensicIndex>,
    events: Arc<dyn SecurityEventSink>,
    identities: Arc<IdentityKeyManager>,
    watermark: WatermarkCodec,
    wrap_permits: Arc<Semaphore>,
}

impl SharingOrchestrator {
    /// Validates `config` and fixes the watermark strategy from
    /// `capabilities` for the orchestrator's lifetime.
    pub fn new(
        config: ShareConfig,
        collaborators: Collaborators,
        capabilities: &Capabilities,
    ) -> ShareResult<Self> {
        config.validate()?;

        let secrets = ChunkedSecretStore::with_item_limit(
            collaborators.secrets,
            config.secret_item_limit,
        );
        let identities = IdentityKeyManager::new(
            secrets,
            Arc::clone(&collaborators.directory),
            Arc::clone(&collaborators.events),
            &config,
        );

        Ok(Self {
            wrap_permits: Arc::new(Semaphore::new(config.max_concurrent_wraps)),
            config,
            backend: collaborators.backend,
            directory: collaborators.directory,
            fingerprint: collaborators.fingerprint,
            forensics: collaborators.forensics,
            events: collaborators.events,
            identities: Arc::new(identities),
            watermark: WatermarkCodec::new(capabilities),
        })
    }

    pub fn identities(&self) -> &IdentityKeyManager {
        &self.identities
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    /// Encrypts a new document and grants the owner and every recipient
    /// access. The owner's grant must succeed; recipient grants are
    /// reported individually.
    ///
    /// The document is encrypted once for all holders, so its watermark
    /// names every recipient of this call (or the owner when there are
    /// none). Recipients added later through [`share`](Self::share) open the
    /// same copy and are not named in it.
    pub async fn protect(&self, request: ProtectRequest) -> ShareResult<ProtectReport> {
        let size = request.content.len() as u64;
        if size > self.config.max_document_bytes {
            return Err(ShareError::StorageSizeExceeded {
                size,
                max: self.config.max_document_bytes,
            });
        }

        let owner_public = self.identities.ensure_keypair(&request.owner.holder_id).await?;
        let key = ContentKey::generate();

        let (plaintext, watermark_method, watermark_hash) = if self.config.watermark_enabled {
            let recipient_email = watermark_recipients(&request);
            let payload = build_signed_payload(
                &request.document_id,
                &recipient_email,
                &self.fingerprint.device_hash(),
                &key,
            )?;
            let embedded = self.watermark.embed(&request.content, &payload, request.kind)?;
            let hash = generate_watermark_hash(&payload);
            self.forensics
                .record(
                    &hash,
                    ForensicRecord {
                        document_id: request.document_id.clone(),
                        recipient_email,
                    },
                )
                .await?;
            debug!(
                "watermarked {} using {:?}",
                request.document_id, embedded.method
            );
            (embedded.data, Some(embedded.method), Some(hash))
        } else {
            (request.content, None, None)
        };

        let blob = encrypt(&plaintext, &key)?;
        let blob_bytes = blob.len();
        self.backend.put_blob(&request.document_id, blob).await?;

        let ciphertext = wrap_blocking(&key, &owner_public).await?;
        self.backend
            .put_wrapped_key(WrappedKey {
                document_id: request.document_id.clone(),
                holder_id: request.owner.holder_id.clone(),
                ciphertext,
            })
            .await?;

        let share = self
            .grant_all(&request.document_id, key, request.recipients)
            .await;
        info!(
            "protected {} ({blob_bytes} bytes), granted {}/{} recipients",
            request.document_id,
            share.granted().count(),
            share.outcomes.len()
        );

        Ok(ProtectReport {
            document_id: request.document_id,
            blob_bytes,
            watermark_method,
            watermark_hash,
            share,
        })
    }

    /// Grants `recipients` access to a document `owner` already holds.
    ///
    /// Each grant runs in its own task, so dropping the returned future does
    /// not cancel grants that already started; they still complete and are
    /// recorded. Partial success is reported, never rolled back.
    pub async fn share(
        &self,
        owner: &str,
        document_id: &str,
        recipients: Vec<Recipient>,
    ) -> ShareResult<ShareReport> {
        let key = self.unwrap_for(owner, document_id).await?;
        let report = self.grant_all(document_id, key, recipients).await;
        info!(
            "shared {document_id}: granted {}/{} recipients",
            report.granted().count(),
            report.outcomes.len()
        );
        Ok(report)
    }

    /// Removes `holder_id`'s wrapped key. Returns whether access existed.
    pub async fn revoke(&self, document_id: &str, holder_id: &str) -> ShareResult<bool> {
        let removed = self.backend.delete_wrapped_key(document_id, holder_id).await?;
        if removed {
            info!("revoked {holder_id} from {document_id}");
            self.events
                .emit(SecurityEvent::AccessRevoked {
                    document_id: document_id.to_string(),
                    holder_id: holder_id.to_string(),
                    at: chrono::Utc::now(),
                })
                .await;
        } else {
            debug!("revoke: {holder_id} had no access to {document_id}");
        }
        Ok(removed)
    }

    /// Opens a document as `holder_id`.
    ///
    /// A watermark that fails verification does not block access: the
    /// document is returned in [`OpenState::TamperDetected`] and a security
    /// event is emitted. Unwrap and decryption failures are hard stops.
    pub async fn open(
        &self,
        holder_id: &str,
        document_id: &str,
        kind: ContentKind,
    ) -> ShareResult<OpenedDocument> {
        let mut session = OpenSession::new();

        let row = self
            .backend
            .get_wrapped_key(document_id, holder_id)
            .await?
            .ok_or_else(|| ShareError::NotFound(format!("{document_id} for {holder_id}")))?;
        let blob = self
            .backend
            .get_blob(document_id)
            .await?
            .ok_or_else(|| ShareError::NotFound(document_id.to_string()))?;
        let private = self.identities.private_key(holder_id).await?;

        let key = match unwrap_blocking(row.ciphertext, private).await {
            Ok(key) => {
                session.advance(OpenState::KeyUnwrapped);
                key
            }
            Err(e) => {
                session.advance(OpenState::KeyUnwrapFailed);
                warn!("unwrap failed for {holder_id} on {document_id}: {e}");
                self.events
                    .emit(SecurityEvent::UnwrapFailed {
                        document_id: document_id.to_string(),
                        holder_id: holder_id.to_string(),
                        at: chrono::Utc::now(),
                    })
                    .await;
                return Err(ShareError::UnwrapFailed(document_id.to_string()));
            }
        };

        let plaintext = match decrypt_bytes(&blob, &key) {
            Ok(plaintext) => {
                session.advance(OpenState::Decrypted);
                plaintext
            }
            Err(e) => {
                session.advance(OpenState::DecryptionFailed);
                warn!("decryption failed for {document_id}: {e}");
                self.events
                    .emit(SecurityEvent::DecryptionFailed {
                        document_id: document_id.to_string(),
                        holder_id: holder_id.to_string(),
                        at: chrono::Utc::now(),
                    })
                    .await;
                return Err(ShareError::DecryptionFailed);
            }
        };

        let payload = self.watermark.extract(&plaintext, kind);
        let verification = payload.as_ref().map(|payload| {
            session.advance(OpenState::WatermarkExtracted);
            verify(payload, &key)
        });

        match verification {
            None => session.advance(OpenState::Unverifiable),
            Some(v) if v.valid => session.advance(OpenState::Verified),
            Some(v) => {
                session.advance(OpenState::TamperDetected);
                warn!(
                    "watermark verification failed for {document_id} opened by {holder_id}: {:?}",
                    v.reason
                );
                self.events
                    .emit(SecurityEvent::TamperDetected {
                        document_id: document_id.to_string(),
                        holder_id: holder_id.to_string(),
                        at: chrono::Utc::now(),
                    })
                    .await;
            }
        }

        debug!("opened {document_id} for {holder_id}: {:?}", session.state);
        Ok(OpenedDocument {
            document_id: document_id.to_string(),
            render_base64: STANDARD.encode(self.watermark.strip(&plaintext, kind)),
            content_base64: STANDARD.encode(&plaintext),
            state: session.state,
            transitions: session.transitions,
            payload,
            verification,
        })
    }

    /// Reads the watermark from a leaked copy and looks up which issued copy
    /// it came from. `None` when the content carries no watermark.
    pub async fn trace_leak(
        &self,
        content: &[u8],
        kind: ContentKind,
    ) -> ShareResult<Option<LeakTrace>> {
        let Some(payload) = self.watermark.extract(content, kind) else {
            return Ok(None);
        };
        let watermark_hash = generate_watermark_hash(&payload);
        let record = self.forensics.lookup(&watermark_hash).await?;
        if record.is_none() {
            warn!("leaked copy of {} has an unknown watermark", payload.document_id);
        }
        Ok(Some(LeakTrace {
            payload,
            watermark_hash,
            record,
        }))
    }

    async fn unwrap_for(&self, holder_id: &str, document_id: &str) -> ShareResult<ContentKey> {
        let row = self
            .backend
            .get_wrapped_key(document_id, holder_id)
            .await?
            .ok_or_else(|| ShareError::NotFound(format!("{document_id} for {holder_id}")))?;
        let private = self.identities.private_key(holder_id).await?;
        unwrap_blocking(row.ciphertext, private)
            .await
            .map_err(|e| {
                warn!("unwrap failed for {holder_id} on {document_id}: {e}");
                ShareError::UnwrapFailed(document_id.to_string())
            })
    }

    async fn grant_all(
        &self,
        document_id: &str,
        key: ContentKey,
        recipients: Vec<Recipient>,
    ) -> ShareReport {
        let key = Arc::new(key);
        let handles: Vec<_> = recipients
            .into_iter()
            .map(|recipient| {
                let holder_id = recipient.holder_id.clone();
                let task = GrantTask {
                    document_id: document_id.to_string(),
                    recipient,
                    key: Arc::clone(&key),
                    backend: Arc::clone(&self.backend),
                    directory: Arc::clone(&self.directory),
                    permits: Arc::clone(&self.wrap_permits),
                };
                (holder_id, tokio::spawn(task.run()))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (holder_id, handle) in handles {
            let outcome = handle
                .await
                .unwrap_or_else(|e| RecipientOutcome::Failed(format!("grant task failed: {e}")));
            if let RecipientOutcome::Failed(reason) = &outcome {
                warn!("grant of {document_id} to {holder_id} failed: {reason}");
            }
            outcomes.push((holder_id, outcome));
        }

        ShareReport {
            document_id: document_id.to_string(),
            outcomes,
        }
    }
}

/// The recipient field of a protect-time watermark: each distinct
/// recipient email in request order, or the owner's when there are none.
fn watermark_recipients(request: &ProtectRequest) -> String {
    let mut emails: Vec<&str> = Vec::with_capacity(request.recipients.len());
    for recipient in &request.recipients {
        if !emails.contains(&recipient.email.as_str()) {
            emails.push(&recipient.email);
        }
    }
    if emails.is_empty() {
        return request.owner.email.clone();
    }
    emails.join(RECIPIENT_SEPARATOR)
}

/// One recipient's grant, detached from the caller once spawned.
struct GrantTask {
    document_id: String,
    recipient: Recipient,
    key: Arc<ContentKey>,
    backend: Arc<dyn DocumentBackend>,
    directory: Arc<dyn ProfileDirectory>,
    permits: Arc<Semaphore>,
}

impl GrantTask {
    async fn run(self) -> RecipientOutcome {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return RecipientOutcome::Failed("wrap pool closed".into());
        };
        let holder_id = self.recipient.holder_id.as_str();

        let encoded = match self.directory.public_key(holder_id).await {
            Ok(Some(encoded)) => encoded,
            Ok(None) => {
                debug!("{holder_id} has no public key yet");
                return RecipientOutcome::NoPublicKey;
            }
            Err(e) => return RecipientOutcome::Failed(e.to_string()),
        };
        let public = match PublicKey::import(&encoded) {
            Ok(public) => public,
            Err(e) => return RecipientOutcome::Failed(format!("unusable public key: {e}")),
        };

        let ciphertext = match wrap_blocking(&self.key, &public).await {
            Ok(ciphertext) => ciphertext,
            Err(e) => return RecipientOutcome::Failed(e.to_string()),
        };

        let row = WrappedKey {
            document_id: self.document_id.clone(),
            holder_id: holder_id.to_string(),
            ciphertext,
        };
        match self.backend.put_wrapped_key(row).await {
            Ok(()) => {
                debug!("granted {} to {holder_id}", self.document_id);
                RecipientOutcome::Granted
            }
            Err(e) => RecipientOutcome::Failed(e.to_string()),
        }
    }
}

/// Tracks the state machine of one open call.
struct OpenSession {
    state: OpenState,
    transitions: Vec<OpenState>,
}

impl OpenSession {
    fn new() -> Self {
        Self {
            state: OpenState::NotLoaded,
            transitions: vec![OpenState::NotLoaded],
        }
    }

    fn advance(&mut self, next: OpenState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal open transition {:?} -> {next:?}",
            self.state
        );
        self.state = next;
        self.transitions.push(next);
    }
}

async fn wrap_blocking(key: &ContentKey, public: &PublicKey) -> ShareResult<String> {
    let key = key.clone();
    let public = public.clone();
    tokio::task::spawn_blocking(move || wrap_key(&key, &public))
        .await
        .map_err(|e| ShareError::Backend(format!("wrap task failed: {e}")))?
        .map_err(ShareError::from)
}

async fn unwrap_blocking(wrapped: String, private: PrivateKey) -> ShareResult<ContentKey> {
    tokio::task::spawn_blocking(move || unwrap_key(&wrapped, &private))
        .await
        .map_err(|e| ShareError::Backend(format!("unwrap task failed: {e}")))?
        .map_err(ShareError::from)
}
