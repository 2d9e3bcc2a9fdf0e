//! Cryptographic core for SealDoc.
//!
//! Provides hybrid document protection using:
//! - AES-256-GCM for document content
//! - RSA-2048 OAEP (SHA-256) for wrapping content keys per recipient
//! - HMAC-SHA256 signed forensic watermarks embedded into the plaintext
//!
//! # Architecture
//!
//! Each document gets its own random [`ContentKey`]:
//!
//! 1. **Watermark**: a payload binding document, recipient, time and device
//!    is signed with the content key and embedded into the plaintext.
//!
//! 2. **Encrypt**: the watermarked plaintext is sealed with AES-256-GCM.
//!
//! 3. **Wrap**: the content key is encrypted once per holder's RSA public
//!    key. Only wrapped keys and ciphertext ever reach the server.
//!
//! Opening reverses the chain; the watermark is then verified against the
//! unwrapped content key. A failed verification is a flag, never an error.

pub mod cipher;
mod error;
pub mod keys;
pub mod watermark;
pub mod wrap;

pub use cipher::{
    CipherInput, ContentKey, IV_SIZE, KEY_SIZE, TAG_SIZE, decrypt, decrypt_bytes, encrypt,
};
pub use error::{CryptoError, CryptoResult};
pub use keys::{
    KeyEncoding, KeyMaterial, KeyPair, PrivateKey, PublicKey, RSA_KEY_BITS, RSA_PUBLIC_EXPONENT,
    generate_keypair,
};
pub use watermark::{
    Capabilities, ContentKind, EmbedMethod, Embedded, PixelBuffer, PixelCodec, Verification,
    VerifyFailure, WatermarkCodec, WatermarkPayload, build_signed_payload,
    generate_watermark_hash, verify, verify_encoded,
};
pub use wrap::{unwrap_key, wrap_key};
