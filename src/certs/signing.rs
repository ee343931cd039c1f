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

//! Approval of certificate requests by the root authority.

use std::time::Duration;

use const_oid::db::rfc5280::{
    ID_CE_BASIC_CONSTRAINTS, ID_CE_EXT_KEY_USAGE, ID_CE_KEY_USAGE, ID_CE_NAME_CONSTRAINTS,
};
use const_oid::db::rfc5912::{
    SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::asn1::{BitString, OctetString};
use der::{Decode, Encode};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::{debug, info, warn};
use x509_cert::ext::pkix::{ExtendedKeyUsage, KeyUsage, KeyUsages};
use x509_cert::ext::Extension;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_cert::{Certificate, TbsCertificate, Version};

use super::authority::RootAuthority;
use super::profile::ExtendedUsage;
use super::request::{CertificateRequest, SignedCertificate};
use super::serial::SerialNumberGenerator;
use super::verify::{verify_rsa_signature, TrustPool};
use super::DEFAULT_CERTIFICATE_LIFETIME;
use crate::error::{PkiError, Result};

/// PKCS#9 extensionRequest attribute.
const ID_EXTENSION_REQ: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");

/// Extensions only the authority decides on; a request cannot ask for them.
const AUTHORITY_CONTROLLED: [ObjectIdentifier; 4] = [
    ID_CE_KEY_USAGE,
    ID_CE_EXT_KEY_USAGE,
    ID_CE_BASIC_CONSTRAINTS,
    ID_CE_NAME_CONSTRAINTS,
];

/// Extended key usages granted to an approved certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsagePolicy {
    /// TLS server and client authentication.
    ServerAndClient,
    /// TLS server authentication only.
    ServerOnly,
    /// TLS client authentication only.
    ClientOnly,
}

impl KeyUsagePolicy {
    /// The usages this policy grants.
    pub fn extended_usages(self) -> &'static [ExtendedUsage] {
        match self {
            Self::ServerAndClient => &[ExtendedUsage::ServerAuth, ExtendedUsage::ClientAuth],
            Self::ServerOnly => &[ExtendedUsage::ServerAuth],
            Self::ClientOnly => &[ExtendedUsage::ClientAuth],
        }
    }
}

/// Mints leaf certificates for certificate requests.
///
/// The engine copies the requested subject, public key and extensions from
/// the CSR, sets the issuer to the root's subject, restricts key usage to
/// digital signatures and grants the policy's extended key usages.
#[derive(Debug, Clone)]
pub struct SigningEngine {
    serials: SerialNumberGenerator,
    lifetime: Duration,
}

impl Default for SigningEngine {
    fn default() -> Self {
        Self::new(SerialNumberGenerator::default(), DEFAULT_CERTIFICATE_LIFETIME)
    }
}

impl SigningEngine {
    /// Create an engine issuing certificates valid for `lifetime`.
    pub fn new(serials: SerialNumberGenerator, lifetime: Duration) -> Self {
        Self { serials, lifetime }
    }

    /// Lifetime of issued certificates.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Approve for both server and client authentication.
    pub fn approve_server_and_client(
        &self,
        authority: &RootAuthority,
        request: &mut CertificateRequest,
    ) -> Result<()> {
        self.approve(authority, request, KeyUsagePolicy::ServerAndClient)
    }

    /// Approve for server authentication only.
    pub fn approve_server(
        &self,
        authority: &RootAuthority,
        request: &mut CertificateRequest,
    ) -> Result<()> {
        self.approve(authority, request, KeyUsagePolicy::ServerOnly)
    }

    /// Approve for client authentication only.
    pub fn approve_client(
        &self,
        authority: &RootAuthority,
        request: &mut CertificateRequest,
    ) -> Result<()> {
        self.approve(authority, request, KeyUsagePolicy::ClientOnly)
    }

    /// Issue a certificate for `request` and attach it once it verifies.
    ///
    /// On any failure the request is left untouched.
    pub fn approve(
        &self,
        authority: &RootAuthority,
        request: &mut CertificateRequest,
        policy: KeyUsagePolicy,
    ) -> Result<()> {
        let signed = self.issue(authority, request, policy)?;
        request.validate_and_accept(signed, policy)
    }

    /// Mint a certificate for `request` without attaching it.
    pub fn issue(
        &self,
        authority: &RootAuthority,
        request: &CertificateRequest,
        policy: KeyUsagePolicy,
    ) -> Result<SignedCertificate> {
        if request.is_approved() {
            return Err(PkiError::AlreadyApproved);
        }
        let csr = request.request();
        verify_request_signature(csr)?;

        let serial = self.serials.generate();
        let mut extensions = vec![
            Extension {
                extn_id: ID_CE_KEY_USAGE,
                critical: true,
                extn_value: OctetString::new(KeyUsage(KeyUsages::DigitalSignature.into()).to_der()?)?,
            },
            Extension {
                extn_id: ID_CE_EXT_KEY_USAGE,
                critical: false,
                extn_value: OctetString::new(
                    ExtendedKeyUsage(policy.extended_usages().iter().map(|u| u.oid()).collect())
                        .to_der()?,
                )?,
            },
        ];
        extensions.extend(
            requested_extensions(csr)?
                .into_iter()
                .filter(|ext| !AUTHORITY_CONTROLLED.contains(&ext.extn_id)),
        );

        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(serial.as_bytes())?,
            signature: csr.algorithm.clone(),
            issuer: authority.certificate().tbs_certificate.subject.clone(),
            validity: Validity::from_now(self.lifetime)?,
            subject: csr.info.subject.clone(),
            subject_public_key_info: csr.info.public_key.clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        };

        let signature = sign_rsa(
            authority.key_pair().private_key(),
            &tbs.signature.oid,
            &tbs.to_der()?,
        )?;
        let minted = Certificate {
            signature_algorithm: tbs.signature.clone(),
            tbs_certificate: tbs,
            signature: BitString::from_bytes(&signature)?,
        };

        let certificate = Certificate::from_der(&minted.to_der()?)?;
        info!(
            serial = %serial,
            subject = %certificate.tbs_certificate.subject,
            ?policy,
            "Issued certificate"
        );
        SignedCertificate::new(certificate, authority.shared_certificate())
    }
}

impl CertificateRequest {
    /// Check an issued certificate and attach it to this request.
    ///
    /// Anything but SHA-256 with RSA is rejected before the chain is
    /// examined. The certificate must then verify against a pool holding
    /// only its root with the policy's usages, and must certify this
    /// request's public key.
    pub fn validate_and_accept(
        &mut self,
        signed: SignedCertificate,
        policy: KeyUsagePolicy,
    ) -> Result<()> {
        let algorithm = &signed.certificate().signature_algorithm.oid;
        if *algorithm != SHA_256_WITH_RSA_ENCRYPTION {
            warn!(%algorithm, "Rejecting certificate with unexpected signature algorithm");
            return Err(PkiError::WrongSignatureAlgorithm(algorithm.to_string()));
        }

        let pool = TrustPool::new(vec![signed.shared_root()]);
        pool.verify(signed.certificate(), policy.extended_usages())?;

        if signed.certificate().tbs_certificate.subject_public_key_info != self.request().info.public_key {
            return Err(PkiError::verification(
                "certificate does not certify the requested public key",
            ));
        }

        self.attach(signed)
    }
}

fn verify_request_signature(csr: &CertReq) -> Result<()> {
    let info = csr.info.to_der()?;
    verify_rsa_signature(
        &csr.info.public_key,
        &csr.algorithm.oid,
        &info,
        csr.signature.raw_bytes(),
    )
    .map_err(|e| match e {
        PkiError::WrongSignatureAlgorithm(_) => e,
        other => PkiError::RequestSignature(other.to_string()),
    })
}

/// Extensions asked for through the CSR's extensionRequest attribute.
fn requested_extensions(csr: &CertReq) -> Result<Vec<Extension>> {
    let mut extensions = Vec::new();
    for attribute in csr.info.attributes.iter() {
        if attribute.oid != ID_EXTENSION_REQ {
            continue;
        }
        for value in attribute.values.iter() {
            extensions.extend(Vec::<Extension>::from_der(&value.to_der()?)?);
        }
    }
    debug!(count = extensions.len(), "Read requested extensions");
    Ok(extensions)
}

fn sign_rsa(key: &RsaPrivateKey, algorithm: &ObjectIdentifier, message: &[u8]) -> Result<Vec<u8>> {
    if *algorithm == SHA_256_WITH_RSA_ENCRYPTION {
        sign_with::<Sha256>(key, message)
    } else if *algorithm == SHA_384_WITH_RSA_ENCRYPTION {
        sign_with::<Sha384>(key, message)
    } else if *algorithm == SHA_512_WITH_RSA_ENCRYPTION {
        sign_with::<Sha512>(key, message)
    } else {
        Err(PkiError::WrongSignatureAlgorithm(algorithm.to_string()))
    }
}

fn sign_with<D>(key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>>
where
    D: Digest + AssociatedOid,
{
    let signing_key = SigningKey::<D>::new(key.clone());
    let signature = signing_key
        .try_sign(message)
        .map_err(|e| PkiError::certificate_build(format!("Failed to sign certificate: {}", e)))?;
    Ok(signature.to_bytes().into_vec())
}
