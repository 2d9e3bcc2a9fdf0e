//! Shared types for share operations.

use chrono::{DateTime, Utc};
use sealdoc_crypto::{ContentKind, EmbedMethod, Verification, WatermarkPayload};
use serde::{Deserialize, Serialize};

/// A content key wrapped for one holder. One row per (document, holder).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub document_id: String,
    pub holder_id: String,
    /// Base64 RSA-OAEP ciphertext of the content key.
    pub ciphertext: String,
}

/// A recipient to grant access to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub holder_id: String,
    pub email: String,
}

impl Recipient {
    pub fn new(holder_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            holder_id: holder_id.into(),
            email: email.into(),
        }
    }
}

/// Result of granting one recipient access.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RecipientOutcome {
    Granted,
    /// The recipient has not published a public key yet. Not an error.
    NoPublicKey,
    Failed(String),
}

impl RecipientOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Everything needed to protect a new document.
#[derive(Clone, Debug)]
pub struct ProtectRequest {
    pub document_id: String,
    pub owner: Recipient,
    pub content: Vec<u8>,
    pub kind: ContentKind,
    pub recipients: Vec<Recipient>,
}

/// Per-recipient results of a share.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareReport {
    pub document_id: String,
    /// In the order recipients were given.
    pub outcomes: Vec<(String, RecipientOutcome)>,
}

impl ShareReport {
    pub fn granted(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_granted())
            .map(|(h, _)| h.as_str())
    }

    pub fn outcome_for(&self, holder_id: &str) -> Option<&RecipientOutcome> {
        self.outcomes
            .iter()
            .find(|(h, _)| h == holder_id)
            .map(|(_, o)| o)
    }

    pub fn all_granted(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.is_granted())
    }
}

/// Result of [`protect`](crate::SharingOrchestrator::protect).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectReport {
    pub document_id: String,
    /// Size of the uploaded ciphertext.
    pub blob_bytes: usize,
    /// How the watermark was placed, if watermarking is enabled.
    pub watermark_method: Option<EmbedMethod>,
    /// Forensic lookup hash recorded for the watermark.
    pub watermark_hash: Option<String>,
    pub share: ShareReport,
}

/// Progress of one open session. The last three are terminal and all allow
/// rendering; the two failures are hard stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenState {
    NotLoaded,
    KeyUnwrapped,
    Decrypted,
    WatermarkExtracted,
    Verified,
    /// No watermark found; nothing to verify.
    Unverifiable,
    TamperDetected,
    KeyUnwrapFailed,
    DecryptionFailed,
}

impl OpenState {
    /// Whether the document may be shown in this state.
    pub fn allows_rendering(self) -> bool {
        matches!(self, Self::Verified | Self::Unverifiable | Self::TamperDetected)
    }

    pub fn is_terminal(self) -> bool {
        self.allows_rendering() || matches!(self, Self::KeyUnwrapFailed | Self::DecryptionFailed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: OpenState) -> bool {
        use OpenState::*;
        matches!(
            (self, next),
            (NotLoaded, KeyUnwrapped)
                | (NotLoaded, KeyUnwrapFailed)
                | (KeyUnwrapped, Decrypted)
                | (KeyUnwrapped, DecryptionFailed)
                | (Decrypted, WatermarkExtracted)
                | (Decrypted, Unverifiable)
                | (WatermarkExtracted, Verified)
                | (WatermarkExtracted, TamperDetected)
        )
    }
}

/// A successfully opened document.
#[derive(Clone, Debug)]
pub struct OpenedDocument {
    pub document_id: String,
    /// Plaintext, base64-encoded, with the watermark still embedded.
    pub content_base64: String,
    /// Plaintext for viewers: reversible watermark placements removed.
    pub render_base64: String,
    pub state: OpenState,
    /// Every state the session passed through, starting at `NotLoaded`.
    pub transitions: Vec<OpenState>,
    pub payload: Option<WatermarkPayload>,
    pub verification: Option<Verification>,
}

impl OpenedDocument {
    pub fn tamper_detected(&self) -> bool {
        self.state == OpenState::TamperDetected
    }
}

/// Security-relevant events for the audit pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityEvent {
    TamperDetected {
        document_id: String,
        holder_id: String,
        at: DateTime<Utc>,
    },
    UnwrapFailed {
        document_id: String,
        holder_id: String,
        at: DateTime<Utc>,
    },
    DecryptionFailed {
        document_id: String,
        holder_id: String,
        at: DateTime<Utc>,
    },
    AccessRevoked {
        document_id: String,
        holder_id: String,
        at: DateTime<Utc>,
    },
    KeyPairRegenerated {
        identity: String,
        at: DateTime<Utc>,
    },
}

/// Separates recipient emails in a watermark naming several recipients.
pub const RECIPIENT_SEPARATOR: &str = ",";

/// Forensic index entry for one watermarked copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForensicRecord {
    pub document_id: String,
    /// Exactly as bound in the watermark payload.
    pub recipient_email: String,
}

impl ForensicRecord {
    /// The individual recipients the copy was issued to.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.recipient_email.split(RECIPIENT_SEPARATOR)
    }
}

/// What a leaked copy reveals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakTrace {
    pub payload: WatermarkPayload,
    pub watermark_hash: String,
    /// Present when the hash matches a copy this system issued.
    pub record: Option<ForensicRecord>,
}

impl LeakTrace {
    /// The leaked payload's fields agree with the issued record. The payload
    /// signature itself can only be checked by a key holder.
    pub fn matches_record(&self) -> bool {
        self.record.as_ref().is_some_and(|r| {
            r.document_id == self.payload.document_id
                && r.recipient_email == self.payload.recipient_email
        })
    }
}
