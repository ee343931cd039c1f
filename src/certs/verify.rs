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

//! Certificate verification against a pool of trusted roots.
//!
//! The pool checks the subset of RFC 5280 path validation a single-level
//! private PKI needs: issuer lookup by name, CA rights of the anchor, the
//! RSA signature, validity windows, extended key usage and DNS name
//! constraints.
//!
//! # Example
//!
//! ```no_run
//! use box_pki::certs::{ExtendedUsage, TrustPool};
//!
//! # fn example(root: std::sync::Arc<x509_cert::Certificate>, leaf: x509_cert::Certificate) -> box_pki::Result<()> {
//! let pool = TrustPool::new(vec![root]);
//! pool.verify(&leaf, &[ExtendedUsage::ServerAuth])?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use const_oid::db::rfc5280::{
    ID_CE_BASIC_CONSTRAINTS, ID_CE_EXT_KEY_USAGE, ID_CE_KEY_USAGE, ID_CE_NAME_CONSTRAINTS,
    ID_CE_SUBJECT_ALT_NAME,
};
use const_oid::db::rfc5912::{
    SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{Decode, Encode};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256, Sha384, Sha512};
use spki::SubjectPublicKeyInfoOwned;
use tracing::debug;
use x509_cert::ext::pkix::constraints::name::GeneralSubtree;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, NameConstraints, SubjectAltName,
};
use x509_cert::ext::Extension;
use x509_cert::Certificate;

use super::profile::ExtendedUsage;
use crate::error::{PkiError, Result};

/// Options for [`TrustPool`].
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Whether to enforce the anchor's DNS name constraints.
    pub enforce_name_constraints: bool,

    /// Allow expired certificates (for testing only).
    pub allow_expired: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            enforce_name_constraints: true,
            allow_expired: false,
        }
    }
}

/// A set of trusted root certificates.
#[derive(Debug, Clone)]
pub struct TrustPool {
    anchors: Vec<Arc<Certificate>>,
    config: VerifyConfig,
}

impl TrustPool {
    /// Create a pool trusting the given roots.
    pub fn new(anchors: Vec<Arc<Certificate>>) -> Self {
        Self {
            anchors,
            config: VerifyConfig::default(),
        }
    }

    /// Create a pool with custom options.
    pub fn with_config(anchors: Vec<Arc<Certificate>>, config: VerifyConfig) -> Self {
        Self { anchors, config }
    }

    /// Verify `cert` against the pool, requiring every usage in `required`.
    pub fn verify(&self, cert: &Certificate, required: &[ExtendedUsage]) -> Result<()> {
        let anchor = self
            .find_issuer(cert)
            .ok_or_else(|| PkiError::verification("certificate signed by unknown authority"))?;
        debug!(
            subject = %cert.tbs_certificate.subject,
            issuer = %anchor.tbs_certificate.subject,
            "Verifying certificate against trust pool"
        );

        check_ca_rights(anchor)?;
        verify_certificate_signature(cert, anchor)?;

        if !self.config.allow_expired {
            check_validity_period(anchor)?;
            check_validity_period(cert)?;
        }

        check_extended_key_usage(cert, anchor, required)?;

        // A root is not bound by its own name constraints.
        if self.config.enforce_name_constraints && cert != anchor {
            check_name_constraints(cert, anchor)?;
        }

        Ok(())
    }

    fn find_issuer(&self, cert: &Certificate) -> Option<&Certificate> {
        let issuer_dn = &cert.tbs_certificate.issuer;
        self.anchors
            .iter()
            .map(|anchor| anchor.as_ref())
            .find(|anchor| &anchor.tbs_certificate.subject == issuer_dn)
    }
}

fn find_extension<'a>(cert: &'a Certificate, oid: &ObjectIdentifier) -> Option<&'a Extension> {
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == *oid)
}

fn decode_extension<'a, T: Decode<'a>>(
    cert: &'a Certificate,
    oid: &ObjectIdentifier,
) -> Result<Option<T>> {
    match find_extension(cert, oid) {
        Some(ext) => Ok(Some(T::from_der(ext.extn_value.as_bytes()).map_err(|e| {
            PkiError::certificate_parsing(format!("Invalid extension {}: {}", oid, e))
        })?)),
        None => Ok(None),
    }
}

fn check_ca_rights(anchor: &Certificate) -> Result<()> {
    if !is_ca_certificate(anchor) {
        return Err(PkiError::verification(
            "issuing certificate is not a certificate authority",
        ));
    }
    if let Some(usage) = decode_extension::<KeyUsage>(anchor, &ID_CE_KEY_USAGE)? {
        if !usage.0.contains(KeyUsages::KeyCertSign) {
            return Err(PkiError::verification(
                "issuing certificate may not sign certificates",
            ));
        }
    }
    Ok(())
}

fn check_validity_period(cert: &Certificate) -> Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| PkiError::verification(format!("System clock error: {}", e)))?;
    let validity = &cert.tbs_certificate.validity;

    if now < validity.not_before.to_unix_duration() {
        return Err(PkiError::verification("certificate is not yet valid"));
    }
    if now > validity.not_after.to_unix_duration() {
        return Err(PkiError::verification("certificate has expired"));
    }
    Ok(())
}

fn check_extended_key_usage(
    cert: &Certificate,
    anchor: &Certificate,
    required: &[ExtendedUsage],
) -> Result<()> {
    for holder in [cert, anchor] {
        // No extension means the holder is not restricted.
        let Some(granted) = decode_extension::<ExtendedKeyUsage>(holder, &ID_CE_EXT_KEY_USAGE)?
        else {
            continue;
        };
        if granted.0.contains(&ExtendedUsage::ANY_OID) {
            continue;
        }
        for usage in required {
            if !granted.0.contains(&usage.oid()) {
                return Err(PkiError::verification(format!(
                    "certificate specifies an incompatible key usage: {} not permitted",
                    usage
                )));
            }
        }
    }
    Ok(())
}

fn check_name_constraints(cert: &Certificate, anchor: &Certificate) -> Result<()> {
    let Some(constraints) = decode_extension::<NameConstraints>(anchor, &ID_CE_NAME_CONSTRAINTS)?
    else {
        return Ok(());
    };
    let permitted = dns_subtrees(constraints.permitted_subtrees.as_deref());
    let excluded = dns_subtrees(constraints.excluded_subtrees.as_deref());

    for name in dns_names(cert)? {
        if excluded.iter().any(|base| dns_name_within(&name, base)) {
            return Err(PkiError::ExcludedDnsName(name));
        }
        if !permitted.is_empty() && !permitted.iter().any(|base| dns_name_within(&name, base)) {
            return Err(PkiError::NotPermittedDnsName(name));
        }
    }
    Ok(())
}

fn dns_subtrees(subtrees: Option<&[GeneralSubtree]>) -> Vec<String> {
    subtrees
        .unwrap_or_default()
        .iter()
        .filter_map(|subtree| match &subtree.base {
            GeneralName::DnsName(name) => Some(name.to_string()),
            _ => None,
        })
        .collect()
}

/// DNS names from the subject alternative name extension.
pub fn dns_names(cert: &Certificate) -> Result<Vec<String>> {
    let Some(san) = decode_extension::<SubjectAltName>(cert, &ID_CE_SUBJECT_ALT_NAME)? else {
        return Ok(Vec::new());
    };
    Ok(san
        .0
        .iter()
        .filter_map(|name| match name {
            GeneralName::DnsName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect())
}

/// Returns true if `name` equals `base` or lies below it.
fn dns_name_within(name: &str, base: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    let base = base.trim_end_matches('.').to_ascii_lowercase();
    if base.is_empty() {
        return true;
    }
    if let Some(suffix) = base.strip_prefix('.') {
        return name.ends_with(&format!(".{}", suffix));
    }
    name == base || name.ends_with(&format!(".{}", base))
}

fn verify_certificate_signature(cert: &Certificate, issuer: &Certificate) -> Result<()> {
    if cert.signature_algorithm != cert.tbs_certificate.signature {
        return Err(PkiError::verification(
            "signature algorithm does not match the signed algorithm",
        ));
    }
    let tbs = cert.tbs_certificate.to_der()?;
    verify_rsa_signature(
        &issuer.tbs_certificate.subject_public_key_info,
        &cert.signature_algorithm.oid,
        &tbs,
        cert.signature.raw_bytes(),
    )
}

/// Verify a PKCS#1 v1.5 RSA signature made with the algorithm `algorithm`.
pub(crate) fn verify_rsa_signature(
    spki: &SubjectPublicKeyInfoOwned,
    algorithm: &ObjectIdentifier,
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    let public_key = RsaPublicKey::from_public_key_der(&spki.to_der()?)
        .map_err(|e| PkiError::verification(format!("Unsupported public key: {}", e)))?;

    if *algorithm == SHA_256_WITH_RSA_ENCRYPTION {
        verify_with::<Sha256>(public_key, message, signature)
    } else if *algorithm == SHA_384_WITH_RSA_ENCRYPTION {
        verify_with::<Sha384>(public_key, message, signature)
    } else if *algorithm == SHA_512_WITH_RSA_ENCRYPTION {
        verify_with::<Sha512>(public_key, message, signature)
    } else {
        Err(PkiError::WrongSignatureAlgorithm(algorithm.to_string()))
    }
}

fn verify_with<D>(public_key: RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<()>
where
    D: Digest + AssociatedOid,
{
    let verifying_key = VerifyingKey::<D>::new(public_key);
    let signature = Signature::try_from(signature)
        .map_err(|e| PkiError::verification(format!("Malformed signature: {}", e)))?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| PkiError::verification("signature does not verify under the issuer's key"))
}

/// Extract the common name from a certificate subject.
pub fn get_subject_cn(cert: &Certificate) -> Option<String> {
    use const_oid::db::rfc4519::CN;

    for rdn in cert.tbs_certificate.subject.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid == CN {
                if let Ok(s) = std::str::from_utf8(atv.value.value()) {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

/// Returns true if the certificate's basic constraints assert `cA`.
pub fn is_ca_certificate(cert: &Certificate) -> bool {
    matches!(
        decode_extension::<BasicConstraints>(cert, &ID_CE_BASIC_CONSTRAINTS),
        Ok(Some(BasicConstraints { ca: true, .. }))
    )
}
