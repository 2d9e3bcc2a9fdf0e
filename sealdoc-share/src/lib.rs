//! Share orchestration for SealDoc.
//!
//! Sequences the crypto core for the document lifecycle:
//! - `protect`: watermark, encrypt and wrap the content key for the owner
//!   and each recipient
//! - `share` / `revoke`: add or remove holders of an existing document
//! - `open`: unwrap, decrypt and verify the embedded watermark
//! - `trace_leak`: map a leaked copy back to the issued copy
//!
//! Storage, the profile directory and the secret store are collaborators
//! behind the traits in [`backend`] and [`sealdoc_keystore::SecretStore`].

pub mod backend;
pub mod config;
pub mod error;
pub mod identity;
pub mod memory;
pub mod orchestrator;
pub mod types;

pub use config::ShareConfig;
pub use error::{ShareError, ShareResult};
pub use identity::IdentityKeyManager;
pub use orchestrator::{Collaborators, SharingOrchestrator};
pub use types::*;
