// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! RSA key material.
//!
//! Keys are generated with the `rsa` crate and converted on demand into the
//! encodings the rest of the authority needs: PKCS#1 for storage, PKCS#8 for
//! `rcgen`, and SubjectPublicKeyInfo for comparing against certificates.

use std::fmt;

use der::{Decode, Encode};
use rand::rngs::OsRng;
use rcgen::KeyPair;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use rustls_pki_types::PrivatePkcs8KeyDer;
use spki::SubjectPublicKeyInfoOwned;
use tracing::debug;

use super::DEFAULT_KEY_STRENGTH;
use crate::error::{PkiError, Result};

/// Smallest modulus accepted for box keys.
pub const MIN_KEY_STRENGTH: usize = 2048;

/// Generates RSA key pairs of a configured strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPairFactory {
    bits: usize,
}

impl Default for KeyPairFactory {
    fn default() -> Self {
        Self {
            bits: DEFAULT_KEY_STRENGTH,
        }
    }
}

impl KeyPairFactory {
    /// Create a factory for `bits` bit moduli.
    pub fn new(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_STRENGTH {
            return Err(PkiError::key(format!(
                "RSA key strength {} is below the minimum of {}",
                bits, MIN_KEY_STRENGTH
            )));
        }
        Ok(Self { bits })
    }

    /// Configured modulus size.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Generate a fresh key pair.
    pub fn generate(&self) -> Result<RsaKeyPair> {
        debug!(bits = self.bits, "Generating RSA key pair");
        let private_key = RsaPrivateKey::new(&mut OsRng, self.bits)
            .map_err(|e| PkiError::key(format!("Failed to generate RSA key: {}", e)))?;
        Ok(RsaKeyPair::from_private_key(private_key))
    }
}

/// An RSA private key together with its public half.
#[derive(Clone)]
pub struct RsaKeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl RsaKeyPair {
    /// Wrap an existing private key.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = private_key.to_public_key();
        Self {
            private_key,
            public_key,
        }
    }

    /// Decode a PKCS#1 DER private key.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| PkiError::key(format!("Failed to decode PKCS#1 key: {}", e)))?;
        Ok(Self::from_private_key(private_key))
    }

    /// Encode the private key as PKCS#1 DER.
    pub fn to_pkcs1_der(&self) -> Result<Vec<u8>> {
        let doc = self
            .private_key
            .to_pkcs1_der()
            .map_err(|e| PkiError::key(format!("Failed to encode PKCS#1 key: {}", e)))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// The private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// The public key as a SubjectPublicKeyInfo structure.
    pub fn subject_public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let der = self
            .public_key
            .to_public_key_der()
            .map_err(|e| PkiError::key(format!("Failed to encode public key: {}", e)))?;
        Ok(SubjectPublicKeyInfoOwned::from_der(der.as_bytes())?)
    }

    /// Returns true if `spki` carries this pair's public key.
    pub fn matches(&self, spki: &SubjectPublicKeyInfoOwned) -> Result<bool> {
        Ok(self.subject_public_key_info()?.to_der()? == spki.to_der()?)
    }

    /// Convert into an `rcgen` key pair signing with SHA-256 over RSA.
    pub(crate) fn to_rcgen(&self) -> Result<KeyPair> {
        let pkcs8 = self
            .private_key
            .to_pkcs8_der()
            .map_err(|e| PkiError::key(format!("Failed to encode PKCS#8 key: {}", e)))?;
        let der = PrivatePkcs8KeyDer::from(pkcs8.as_bytes().to_vec());
        KeyPair::from_pkcs8_der_and_sign_algo(&der, &rcgen::PKCS_RSA_SHA256)
            .map_err(|e| PkiError::key(format!("Failed to load key into rcgen: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn test_factory_rejects_weak_keys() {
        assert!(matches!(KeyPairFactory::new(1024), Err(PkiError::Key(_))));
        assert_eq!(KeyPairFactory::new(2048).unwrap().bits(), 2048);
        assert_eq!(KeyPairFactory::default().bits(), DEFAULT_KEY_STRENGTH);
    }

    #[test]
    fn test_pkcs1_roundtrip() {
        let pair = test_support::key_pair();
        let der = pair.to_pkcs1_der().unwrap();
        assert_eq!(der[0], 0x30);

        let decoded = RsaKeyPair::from_pkcs1_der(&der).unwrap();
        assert_eq!(decoded.to_pkcs1_der().unwrap(), der);
        assert_eq!(decoded.public_key(), pair.public_key());
    }

    #[test]
    fn test_matches_own_public_key() {
        let pair = test_support::key_pair();
        let spki = pair.subject_public_key_info().unwrap();
        assert!(pair.matches(&spki).unwrap());

        let other = test_support::authority();
        assert!(!other.key_pair().matches(&spki).unwrap());
    }

    #[test]
    fn test_rcgen_conversion() {
        let pair = test_support::key_pair();
        let rcgen_pair = pair.to_rcgen().unwrap();
        assert_eq!(rcgen_pair.algorithm(), &rcgen::PKCS_RSA_SHA256);
    }

    #[test]
    fn test_garbage_key_rejected() {
        assert!(matches!(
            RsaKeyPair::from_pkcs1_der(&[0x30, 0x03, 0x02, 0x01, 0x00]),
            Err(PkiError::Key(_))
        ));
    }
}
