//! RSA-2048 identity keys and their transport encoding.
//!
//! Keys travel as the base64 body of a DER structure with the PEM
//! header/footer stripped. Two DER layouts are accepted on import: the
//! primary one (SPKI for public keys, PKCS#8 for private keys) and PKCS#1 as
//! a fallback, since keys produced by older clients use the bare RSA
//! structures. Each key remembers which layout it came from and exports in
//! that same layout.

use crate::error::{CryptoError, CryptoResult};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;

/// Modulus size for identity keys.
pub const RSA_KEY_BITS: usize = 2048;

/// Public exponent used by [`generate_keypair`].
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

/// DER layout a key was decoded from (or will be encoded to).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// SubjectPublicKeyInfo (public) or PKCS#8 (private).
    Primary,
    /// Bare PKCS#1 `RSAPublicKey` / `RSAPrivateKey`.
    Pkcs1,
}

/// Operations every key representation supports.
pub trait KeyMaterial {
    /// The DER layout this key is exported in.
    fn encoding(&self) -> KeyEncoding;

    /// Exports the key as a base64 DER body without PEM delimiters.
    fn export(&self) -> CryptoResult<String>;
}

/// An RSA public key, tagged with its transport representation.
#[derive(Clone, PartialEq, Eq)]
pub enum PublicKey {
    Spki(RsaPublicKey),
    Pkcs1(RsaPublicKey),
}

/// An RSA private key, tagged with its transport representation.
///
/// The inner key zeroizes itself on drop.
#[derive(Clone)]
pub enum PrivateKey {
    Pkcs8(RsaPrivateKey),
    Pkcs1(RsaPrivateKey),
}

/// An identity key pair. The private half must never leave the device.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

/// Generates an RSA-2048 key pair with public exponent 65537.
///
/// This is CPU heavy (hundreds of milliseconds on mobile hardware), so async
/// callers should run it on a blocking thread. Nothing is persisted here, so a
/// failed attempt can simply be retried.
pub fn generate_keypair() -> CryptoResult<KeyPair> {
    let exponent = rsa::BigUint::from(RSA_PUBLIC_EXPONENT);
    let private = RsaPrivateKey::new_with_exp(&mut OsRng, RSA_KEY_BITS, &exponent)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public = RsaPublicKey::from(&private);

    Ok(KeyPair {
        public: PublicKey::Spki(public),
        private: PrivateKey::Pkcs8(private),
    })
}

impl KeyPair {
    /// Rebuilds a key pair from its private half.
    pub fn from_private(private: PrivateKey) -> Self {
        let public = match &private {
            PrivateKey::Pkcs8(k) => PublicKey::Spki(RsaPublicKey::from(k)),
            PrivateKey::Pkcs1(k) => PublicKey::Pkcs1(RsaPublicKey::from(k)),
        };
        Self { public, private }
    }
}

impl PublicKey {
    /// Imports a public key from a base64 DER body (or a full PEM document).
    ///
    /// SPKI is tried first, then PKCS#1.
    pub fn import(encoded: &str) -> CryptoResult<Self> {
        if let Some(pem) = as_pem(encoded) {
            if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
                return Ok(Self::Spki(key));
            }
            return RsaPublicKey::from_pkcs1_pem(pem)
                .map(Self::Pkcs1)
                .map_err(|e| CryptoError::KeyFormat(format!("public key PEM: {e}")));
        }

        let der = decode_body(encoded)?;
        if let Ok(key) = RsaPublicKey::from_public_key_der(&der) {
            return Ok(Self::Spki(key));
        }
        RsaPublicKey::from_pkcs1_der(&der)
            .map(Self::Pkcs1)
            .map_err(|_| CryptoError::KeyFormat("not an SPKI or PKCS#1 RSA public key".into()))
    }

    /// Borrows the underlying RSA key regardless of representation.
    pub fn rsa(&self) -> &RsaPublicKey {
        match self {
            Self::Spki(k) | Self::Pkcs1(k) => k,
        }
    }

    /// RSA-OAEP (SHA-256 digest, MGF1-SHA-256) encryption.
    pub(crate) fn oaep_encrypt(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        self.rsa()
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data)
            .map_err(|e| CryptoError::Encryption(format!("rsa-oaep: {e}")))
    }
}

impl KeyMaterial for PublicKey {
    fn encoding(&self) -> KeyEncoding {
        match self {
            Self::Spki(_) => KeyEncoding::Primary,
            Self::Pkcs1(_) => KeyEncoding::Pkcs1,
        }
    }

    fn export(&self) -> CryptoResult<String> {
        let encoded = match self {
            Self::Spki(k) => k
                .to_public_key_der()
                .map(|d| STANDARD.encode(d.as_bytes()))
                .map_err(|e| e.to_string()),
            Self::Pkcs1(k) => k
                .to_pkcs1_der()
                .map(|d| STANDARD.encode(d.as_bytes()))
                .map_err(|e| e.to_string()),
        };
        encoded.map_err(|e| CryptoError::KeyFormat(format!("public key export: {e}")))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({:?})", self.encoding())
    }
}

impl PrivateKey {
    /// Imports a private key from a base64 DER body (or a full PEM document).
    ///
    /// PKCS#8 is tried first, then PKCS#1.
    pub fn import(encoded: &str) -> CryptoResult<Self> {
        if let Some(pem) = as_pem(encoded) {
            if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
                return Ok(Self::Pkcs8(key));
            }
            return RsaPrivateKey::from_pkcs1_pem(pem)
                .map(Self::Pkcs1)
                .map_err(|e| CryptoError::KeyFormat(format!("private key PEM: {e}")));
        }

        let der = decode_body(encoded)?;
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(&der) {
            return Ok(Self::Pkcs8(key));
        }
        RsaPrivateKey::from_pkcs1_der(&der)
            .map(Self::Pkcs1)
            .map_err(|_| CryptoError::KeyFormat("not a PKCS#8 or PKCS#1 RSA private key".into()))
    }

    /// Borrows the underlying RSA key regardless of representation.
    pub fn rsa(&self) -> &RsaPrivateKey {
        match self {
            Self::Pkcs8(k) | Self::Pkcs1(k) => k,
        }
    }

    /// RSA-OAEP (SHA-256 digest, MGF1-SHA-256) decryption.
    pub(crate) fn oaep_decrypt(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        self.rsa()
            .decrypt(Oaep::new::<Sha256>(), data)
            .map_err(|e| CryptoError::Unwrap(format!("rsa-oaep: {e}")))
    }
}

impl KeyMaterial for PrivateKey {
    fn encoding(&self) -> KeyEncoding {
        match self {
            Self::Pkcs8(_) => KeyEncoding::Primary,
            Self::Pkcs1(_) => KeyEncoding::Pkcs1,
        }
    }

    fn export(&self) -> CryptoResult<String> {
        let encoded = match self {
            Self::Pkcs8(k) => k
                .to_pkcs8_der()
                .map(|d| STANDARD.encode(d.as_bytes()))
                .map_err(|e| e.to_string()),
            Self::Pkcs1(k) => k
                .to_pkcs1_der()
                .map(|d| STANDARD.encode(d.as_bytes()))
                .map_err(|e| e.to_string()),
        };
        encoded.map_err(|e| CryptoError::KeyFormat(format!("private key export: {e}")))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({:?}, <redacted>)", self.encoding())
    }
}

/// A full PEM document, left to the `rsa` decoders.
fn as_pem(encoded: &str) -> Option<&str> {
    let trimmed = encoded.trim();
    trimmed.starts_with("-----BEGIN ").then_some(trimmed)
}

/// Base64-decodes a headerless DER body, ignoring line breaks.
fn decode_body(encoded: &str) -> CryptoResult<Vec<u8>> {
    let body: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    if body.is_empty() {
        return Err(CryptoError::KeyFormat("empty key string".into()));
    }

    STANDARD
        .decode(body.as_bytes())
        .map_err(|e| CryptoError::KeyFormat(format!("key body is not base64: {e}")))
}
