//! Secure secret storage for SealDoc.
//!
//! Private keys live in the platform secret store, which limits the size of
//! a single item. [`ChunkedSecretStore`] layers two-part storage over any
//! [`SecretStore`] so a full RSA private key fits.

pub mod chunked;
pub mod error;
pub mod store;

pub use chunked::{ChunkedSecretStore, DEFAULT_ITEM_LIMIT};
pub use error::{KeystoreError, KeystoreResult};
#[cfg(feature = "platform-keyring")]
pub use store::KeyringSecretStore;
pub use store::{MemorySecretStore, SecretStore};
