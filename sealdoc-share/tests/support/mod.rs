//! Shared harness for orchestrator integration tests.

#![allow(dead_code)]

use sealdoc_crypto::{Capabilities, KeyPair, generate_keypair};
use sealdoc_keystore::MemorySecretStore;
use sealdoc_share::memory::{
    MemoryBackend, MemoryDirectory, MemoryForensicIndex, RecordingEventSink, StaticFingerprint,
};
use sealdoc_share::{Collaborators, Recipient, ShareConfig, SharingOrchestrator};
use std::sync::{Arc, OnceLock};

pub const DEVICE: &str = "device-hash-01";

/// Key generation is the slow part of every test; generate each fixture
/// identity once per test binary.
pub fn fixture_keypair(name: &str) -> KeyPair {
    static ALICE: OnceLock<KeyPair> = OnceLock::new();
    static BOB: OnceLock<KeyPair> = OnceLock::new();
    static CAROL: OnceLock<KeyPair> = OnceLock::new();

    let cell = match name {
        "alice" => &ALICE,
        "bob" => &BOB,
        "carol" => &CAROL,
        other => panic!("no fixture key pair for {other}"),
    };
    cell.get_or_init(|| generate_keypair().expect("fixture key generation"))
        .clone()
}

pub fn recipient(name: &str) -> Recipient {
    Recipient::new(name, format!("{name}@x.com"))
}

pub struct Harness {
    pub backend: MemoryBackend,
    pub directory: MemoryDirectory,
    pub secrets: MemorySecretStore,
    pub forensics: MemoryForensicIndex,
    pub events: RecordingEventSink,
    pub orchestrator: SharingOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ShareConfig::default())
    }

    pub fn with_config(config: ShareConfig) -> Self {
        let directory = MemoryDirectory::new();
        Self::build(config, Arc::new(directory.clone()), directory)
    }

    /// Uses `directory` for lookups while keeping `seen` as the handle
    /// tests inspect.
    pub fn build(
        config: ShareConfig,
        directory: Arc<dyn sealdoc_share::backend::ProfileDirectory>,
        seen: MemoryDirectory,
    ) -> Self {
        let backend = MemoryBackend::new();
        let secrets = MemorySecretStore::with_item_limit(config.secret_item_limit);
        let forensics = MemoryForensicIndex::new();
        let events = RecordingEventSink::new();

        let orchestrator = SharingOrchestrator::new(
            config,
            Collaborators {
                backend: Arc::new(backend.clone()),
                directory,
                secrets: Arc::new(secrets.clone()),
                fingerprint: Arc::new(StaticFingerprint(DEVICE.to_string())),
                forensics: Arc::new(forensics.clone()),
                events: Arc::new(events.clone()),
            },
            &Capabilities::none(),
        )
        .expect("valid harness config");

        Self {
            backend,
            directory: seen,
            secrets,
            forensics,
            events,
            orchestrator,
        }
    }

    /// Installs fixture key pairs for `names` and publishes their public keys.
    pub async fn with_identities(self, names: &[&str]) -> Self {
        for name in names {
            self.orchestrator
                .identities()
                .install(name, &fixture_keypair(name))
                .await
                .expect("install fixture identity");
        }
        self
    }
}
