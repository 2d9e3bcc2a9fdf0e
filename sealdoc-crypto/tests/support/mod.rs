//! Shared fixtures for crypto integration tests.
//!
//! RSA-2048 generation dominates test time, so each identity is generated
//! once per test binary.

#![allow(dead_code)]

use sealdoc_crypto::{KeyPair, generate_keypair};
use std::sync::OnceLock;

pub fn alice() -> &'static KeyPair {
    static ALICE: OnceLock<KeyPair> = OnceLock::new();
    ALICE.get_or_init(|| generate_keypair().expect("alice keypair"))
}

pub fn bob() -> &'static KeyPair {
    static BOB: OnceLock<KeyPair> = OnceLock::new();
    BOB.get_or_init(|| generate_keypair().expect("bob keypair"))
}

pub fn carol() -> &'static KeyPair {
    static CAROL: OnceLock<KeyPair> = OnceLock::new();
    CAROL.get_or_init(|| generate_keypair().expect("carol keypair"))
}
