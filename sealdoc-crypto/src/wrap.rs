//! Per-recipient wrapping of content keys under RSA-OAEP.
//!
//! The wrapped plaintext is the content key's 64-character hex string, so a
//! row produced here unwraps to the same `keyHex` on every client.

use crate::cipher::{ContentKey, KEY_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKey, PublicKey};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use zeroize::Zeroizing;

/// Wraps `key` for the holder of `recipient`, returning base64 ciphertext.
///
/// OAEP padding is randomized, so wrapping the same key twice yields
/// different ciphertexts.
pub fn wrap_key(key: &ContentKey, recipient: &PublicKey) -> CryptoResult<String> {
    let key_hex = Zeroizing::new(key.to_hex());
    let wrapped = recipient.oaep_encrypt(key_hex.as_bytes())?;
    Ok(STANDARD.encode(wrapped))
}

/// Unwraps a base64 ciphertext produced by [`wrap_key`].
///
/// Every failure (bad encoding, wrong private key, corrupted ciphertext, or a
/// plaintext that is not a 64-character hex key) surfaces as
/// [`CryptoError::Unwrap`]. Callers must not retry: this is a structural
/// mismatch, and the document should be treated as inaccessible.
pub fn unwrap_key(wrapped: &str, holder: &PrivateKey) -> CryptoResult<ContentKey> {
    let ciphertext = STANDARD
        .decode(wrapped.trim())
        .map_err(|e| CryptoError::Unwrap(format!("wrapped key is not base64: {e}")))?;

    let plaintext = Zeroizing::new(holder.oaep_decrypt(&ciphertext)?);

    if plaintext.len() != KEY_SIZE * 2 {
        return Err(CryptoError::Unwrap(format!(
            "unwrapped key has {} bytes, expected {}",
            plaintext.len(),
            KEY_SIZE * 2
        )));
    }

    let key_hex = std::str::from_utf8(&plaintext)
        .map_err(|_| CryptoError::Unwrap("unwrapped key is not utf-8".into()))?;
    ContentKey::from_hex(key_hex).map_err(|e| CryptoError::Unwrap(e.to_string()))
}
