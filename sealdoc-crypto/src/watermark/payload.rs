//! Signed watermark payloads.
//!
//! Wire form: `documentId|recipientEmail|timestampMs|deviceHash|signature`,
//! where `signature` is lowercase hex HMAC-SHA256 over everything before the
//! last delimiter, keyed with the document's content key. Field order and
//! encoding are part of the signature: any re-encoding is a different
//! payload.

use crate::cipher::ContentKey;
use crate::error::{CryptoError, CryptoResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

/// Separator between payload fields.
pub const FIELD_DELIMITER: char = '|';

const FIELD_COUNT: usize = 5;

/// A watermark payload binding a document copy to its recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkPayload {
    pub document_id: String,
    pub recipient_email: String,
    pub timestamp_ms: i64,
    pub device_hash: String,
    pub signature: String,
}

/// Why a payload failed verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyFailure {
    /// The HMAC does not match the fields under the given key.
    SignatureMismatch,
    /// The signature field is not valid hex.
    MalformedSignature,
    /// The payload string does not have the five-field layout.
    MalformedPayload,
}

/// Outcome of [`verify`]. A failure is a result to flag, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub valid: bool,
    pub reason: Option<VerifyFailure>,
}

impl Verification {
    fn ok() -> Self {
        Self { valid: true, reason: None }
    }

    fn failed(reason: VerifyFailure) -> Self {
        Self { valid: false, reason: Some(reason) }
    }
}

impl WatermarkPayload {
    /// The exact string the signature covers.
    pub fn unsigned_prefix(&self) -> String {
        unsigned_prefix(
            &self.document_id,
            &self.recipient_email,
            self.timestamp_ms,
            &self.device_hash,
        )
    }

    /// Parses the five-field wire form. Does not check the signature.
    pub fn parse(encoded: &str) -> CryptoResult<Self> {
        let fields: Vec<&str> = encoded.split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(CryptoError::InvalidPayload(format!(
                "expected {FIELD_COUNT} fields, found {}",
                fields.len()
            )));
        }

        let timestamp_ms = fields[2]
            .parse::<i64>()
            .map_err(|_| CryptoError::InvalidPayload(format!("bad timestamp {:?}", fields[2])))?;

        Ok(Self {
            document_id: fields[0].to_string(),
            recipient_email: fields[1].to_string(),
            timestamp_ms,
            device_hash: fields[3].to_string(),
            signature: fields[4].to_string(),
        })
    }
}

impl fmt::Display for WatermarkPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{FIELD_DELIMITER}{}", self.unsigned_prefix(), self.signature)
    }
}

impl FromStr for WatermarkPayload {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Builds and signs a payload, stamping it with the current time.
///
/// The timestamp is taken here rather than accepted from the caller so a
/// recipient cannot backdate their copy.
pub fn build_signed_payload(
    document_id: &str,
    recipient_email: &str,
    device_hash: &str,
    key: &ContentKey,
) -> CryptoResult<WatermarkPayload> {
    let timestamp_ms = chrono::Utc::now().timestamp_millis();
    sign_payload(document_id, recipient_email, timestamp_ms, device_hash, key)
}

pub(crate) fn sign_payload(
    document_id: &str,
    recipient_email: &str,
    timestamp_ms: i64,
    device_hash: &str,
    key: &ContentKey,
) -> CryptoResult<WatermarkPayload> {
    if document_id.is_empty() {
        return Err(CryptoError::InvalidPayload("document id is empty".into()));
    }
    for (name, value) in [
        ("document id", document_id),
        ("recipient email", recipient_email),
        ("device hash", device_hash),
    ] {
        if value.contains(FIELD_DELIMITER) {
            return Err(CryptoError::InvalidPayload(format!(
                "{name} contains the field delimiter"
            )));
        }
    }

    let prefix = unsigned_prefix(document_id, recipient_email, timestamp_ms, device_hash);
    let signature = hex::encode(mac_for(key)?.chain_update(prefix.as_bytes()).finalize().into_bytes());

    Ok(WatermarkPayload {
        document_id: document_id.to_string(),
        recipient_email: recipient_email.to_string(),
        timestamp_ms,
        device_hash: device_hash.to_string(),
        signature,
    })
}

/// Recomputes the HMAC over the unsigned prefix and compares it in constant
/// time against the embedded signature.
pub fn verify(payload: &WatermarkPayload, key: &ContentKey) -> Verification {
    let Ok(expected) = hex::decode(&payload.signature) else {
        return Verification::failed(VerifyFailure::MalformedSignature);
    };

    let Ok(mac) = mac_for(key) else {
        return Verification::failed(VerifyFailure::SignatureMismatch);
    };
    match mac
        .chain_update(payload.unsigned_prefix().as_bytes())
        .verify_slice(&expected)
    {
        Ok(()) => Verification::ok(),
        Err(_) => Verification::failed(VerifyFailure::SignatureMismatch),
    }
}

/// Verifies a payload still in its wire form.
pub fn verify_encoded(encoded: &str, key: &ContentKey) -> Verification {
    match WatermarkPayload::parse(encoded) {
        Ok(payload) => verify(&payload, key),
        Err(_) => Verification::failed(VerifyFailure::MalformedPayload),
    }
}

/// One-way hash of the signed payload for server-side forensic lookup.
pub fn generate_watermark_hash(payload: &WatermarkPayload) -> String {
    hex::encode(Sha256::digest(payload.to_string().as_bytes()))
}

fn unsigned_prefix(
    document_id: &str,
    recipient_email: &str,
    timestamp_ms: i64,
    device_hash: &str,
) -> String {
    format!(
        "{document_id}{d}{recipient_email}{d}{timestamp_ms}{d}{device_hash}",
        d = FIELD_DELIMITER
    )
}

// TODO: derive a dedicated HMAC key (HKDF over the content key) once every
// client can verify a versioned payload; today the content key signs directly.
fn mac_for(key: &ContentKey) -> CryptoResult<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidPayload(format!("HMAC key rejected: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_form_roundtrip() {
        let key = ContentKey::generate();
        let payload = sign_payload("doc-1", "bob@x.com", 1_700_000_000_000, "dev", &key).unwrap();
        let encoded = payload.to_string();

        assert!(encoded.starts_with("doc-1|bob@x.com|1700000000000|dev|"));
        assert_eq!(WatermarkPayload::parse(&encoded).unwrap(), payload);
    }

    #[test]
    fn signature_is_hmac_over_prefix() {
        let key = ContentKey::from_bytes([1u8; 32]);
        let payload = sign_payload("d", "e", 5, "h", &key).unwrap();

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&[1u8; 32]).unwrap();
        mac.update(b"d|e|5|h");
        assert_eq!(payload.signature, hex::encode(mac.finalize().into_bytes()));
        assert_eq!(payload.signature.len(), 64);
    }

    #[test]
    fn every_content_key_builds_a_mac() {
        for key in [ContentKey::from_bytes([0u8; 32]), ContentKey::generate()] {
            assert!(mac_for(&key).is_ok());
        }
    }

    #[test]
    fn delimiter_in_field_rejected() {
        let key = ContentKey::generate();
        let err = sign_payload("doc", "a|b@x.com", 1, "dev", &key).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPayload(_)));
        assert!(sign_payload("", "a@x.com", 1, "dev", &key).is_err());
    }

    #[test]
    fn parse_rejects_wrong_shapes() {
        assert!(WatermarkPayload::parse("a|b|c").is_err());
        assert!(WatermarkPayload::parse("a|b|notanumber|d|sig").is_err());
        assert!(WatermarkPayload::parse("a|b|1|d|sig|extra").is_err());
    }

    #[test]
    fn malformed_signature_reported() {
        let key = ContentKey::generate();
        let mut payload = sign_payload("doc", "a@x.com", 1, "dev", &key).unwrap();
        payload.signature = "not-hex".into();
        assert_eq!(
            verify(&payload, &key),
            Verification { valid: false, reason: Some(VerifyFailure::MalformedSignature) }
        );
        assert_eq!(
            verify_encoded("garbage", &key).reason,
            Some(VerifyFailure::MalformedPayload)
        );
    }

    #[test]
    fn watermark_hash_is_stable_sha256() {
        let key = ContentKey::generate();
        let payload = sign_payload("doc", "a@x.com", 1, "dev", &key).unwrap();
        let h1 = generate_watermark_hash(&payload);
        let h2 = generate_watermark_hash(&payload.clone());
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, payload.signature);
    }
}
