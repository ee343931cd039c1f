//! Integration test utilities and helpers
//!
//! RSA keys are slow to generate, so the root and the client key are built
//! once and shared by every test in the binary.

use std::sync::{Arc, OnceLock};

use box_pki::certs::{
    CertificateProfile, CertificateRequest, KeyPairFactory, RequestBuilder, RootAuthority,
    RootAuthorityBuilder, RsaKeyPair,
};
use box_pki::config::IssuanceConfig;

/// Shared enrollment secret.
pub const SECRET: &str = "wreckage";

/// Organization used in every subject.
pub const COMPANY: &str = "DreamBench";

/// Name of the test box.
pub const SERVER_NAME: &str = "box.local";

/// Key size used by tests.
pub const KEY_STRENGTH: usize = 2048;

static ROOT: OnceLock<Arc<RootAuthority>> = OnceLock::new();
static CLIENT_KEY: OnceLock<RsaKeyPair> = OnceLock::new();

/// A root authority permitting names below `box.local`.
pub fn root() -> Arc<RootAuthority> {
    Arc::clone(ROOT.get_or_init(|| {
        let root = RootAuthorityBuilder::new(CertificateProfile::new(COMPANY, SERVER_NAME))
            .key_strength(KEY_STRENGTH)
            .permit_dns(SERVER_NAME)
            .build()
            .expect("root generation failed");
        Arc::new(root)
    }))
}

/// The client's key pair.
pub fn client_key() -> RsaKeyPair {
    CLIENT_KEY
        .get_or_init(|| {
            KeyPairFactory::new(KEY_STRENGTH)
                .and_then(|factory| factory.generate())
                .expect("key generation failed")
        })
        .clone()
}

/// A fresh CSR for `dns` using the shared client key.
pub fn client_request(dns: &str) -> CertificateRequest {
    RequestBuilder::new(CertificateProfile::new(COMPANY, dns))
        .san_dns(dns)
        .build_with_key(client_key())
        .expect("CSR generation failed")
}

/// Issuance parameters with test sized keys.
pub fn issuance() -> IssuanceConfig {
    IssuanceConfig {
        key_strength: KEY_STRENGTH,
        ..IssuanceConfig::default()
    }
}
