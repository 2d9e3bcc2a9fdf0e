//! Document content encryption using AES-256-GCM.
//!
//! Every call draws a fresh 96-bit IV from the OS RNG. The blob layout is
//! `IV (12 bytes) || ciphertext || tag (16 bytes)`, kept as raw bytes so it
//! travels without base64 overhead.

use crate::error::{CryptoError, CryptoResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-GCM IV in bytes.
pub const IV_SIZE: usize = 12;
/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of a content key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// A per-document AES-256 content key.
///
/// Only ever leaves memory wrapped under a holder's public key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; KEY_SIZE]);

impl ContentKey {
    /// Generates a random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses the 64-character hex form.
    pub fn from_hex(key_hex: &str) -> CryptoResult<Self> {
        let decoded = hex::decode(key_hex.trim())
            .map_err(|e| CryptoError::KeyFormat(format!("content key is not hex: {e}")))?;
        if decoded.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: decoded.len(),
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Lowercase 64-character hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

/// Ciphertext accepted by [`decrypt`]: the raw blob, or its base64 form as
/// written by older clients.
#[derive(Debug, Clone, Copy)]
pub enum CipherInput<'a> {
    Bytes(&'a [u8]),
    Base64(&'a str),
}

impl<'a> From<&'a [u8]> for CipherInput<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for CipherInput<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self::Bytes(bytes.as_slice())
    }
}

impl<'a> From<&'a str> for CipherInput<'a> {
    fn from(encoded: &'a str) -> Self {
        Self::Base64(encoded)
    }
}

/// Encrypts `plaintext`, returning `IV || ciphertext || tag`.
pub fn encrypt(plaintext: &[u8], key: &ContentKey) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("aes-gcm: {e}")))?;

    let mut out = Vec::with_capacity(IV_SIZE + sealed.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypts a blob and returns the plaintext base64-encoded, the form the
/// viewer layer renders directly.
pub fn decrypt<'a>(input: impl Into<CipherInput<'a>>, key: &ContentKey) -> CryptoResult<String> {
    let plaintext = decrypt_bytes(input, key)?;
    Ok(STANDARD.encode(plaintext))
}

/// Decrypts a blob and returns the raw plaintext.
///
/// Any authentication failure is reported as [`CryptoError::Decryption`];
/// no partial plaintext is ever returned.
pub fn decrypt_bytes<'a>(
    input: impl Into<CipherInput<'a>>,
    key: &ContentKey,
) -> CryptoResult<Vec<u8>> {
    let owned;
    let blob: &[u8] = match input.into() {
        CipherInput::Bytes(bytes) => bytes,
        CipherInput::Base64(encoded) => {
            owned = STANDARD.decode(encoded.trim()).map_err(|e| {
                CryptoError::UnsupportedInput(format!("ciphertext string is not base64: {e}"))
            })?;
            &owned
        }
    };

    if blob.len() < IV_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "blob too short: {} bytes",
            blob.len()
        )));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let (iv, sealed) = blob.split_at(IV_SIZE);

    cipher
        .decrypt(Nonce::from_slice(iv), sealed)
        .map_err(|_| CryptoError::Decryption("authentication failed (wrong key or tampered data)".into()))
}
