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

//! Certificate requests and the certificates issued for them.

use std::net::IpAddr;
use std::sync::Arc;

use der::asn1::Ia5String;
use der::{Decode, Encode};
use rcgen::{CertificateParams, CustomExtension};
use tracing::debug;
use x509_cert::ext::pkix::constraints::name::GeneralSubtree;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::NameConstraints;
use x509_cert::request::CertReq;
use x509_cert::Certificate;

use super::codec;
use super::keys::{KeyPairFactory, RsaKeyPair};
use super::profile::{CertificateProfile, SubjectAltNames};
use super::{
    DEFAULT_KEY_STRENGTH, PEM_CERTIFICATE, PEM_CERTIFICATE_REQUEST, PEM_ROOT_CERTIFICATE,
    PEM_RSA_PRIVATE_KEY,
};
use crate::error::{PkiError, Result};

/// id-ce-nameConstraints as `rcgen` arcs.
const NAME_CONSTRAINTS_ARCS: &[u64] = &[2, 5, 29, 30];

/// An issued leaf certificate and the root certificate that signed it.
///
/// The root is shared with the issuing authority and never owned exclusively
/// by the leaf.
#[derive(Debug, Clone)]
pub struct SignedCertificate {
    certificate: Certificate,
    certificate_der: Vec<u8>,
    root: Arc<Certificate>,
    root_der: Vec<u8>,
}

impl SignedCertificate {
    /// Pair a parsed leaf with its issuing root.
    pub fn new(certificate: Certificate, root: Arc<Certificate>) -> Result<Self> {
        let certificate_der = certificate.to_der()?;
        let root_der = root.to_der()?;
        Ok(Self {
            certificate,
            certificate_der,
            root,
            root_der,
        })
    }

    /// Parse a leaf and its root from DER.
    pub fn from_der(certificate_der: &[u8], root_der: &[u8]) -> Result<Self> {
        let certificate = Certificate::from_der(certificate_der).map_err(|e| {
            PkiError::certificate_parsing(format!("Failed to parse certificate: {}", e))
        })?;
        let root = Certificate::from_der(root_der).map_err(|e| {
            PkiError::certificate_parsing(format!("Failed to parse root certificate: {}", e))
        })?;
        Ok(Self {
            certificate,
            certificate_der: certificate_der.to_vec(),
            root: Arc::new(root),
            root_der: root_der.to_vec(),
        })
    }

    /// The issued certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// DER encoding of the issued certificate.
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// The root certificate that issued this one.
    pub fn root_certificate(&self) -> &Certificate {
        &self.root
    }

    /// A shared handle on the root certificate.
    pub fn shared_root(&self) -> Arc<Certificate> {
        Arc::clone(&self.root)
    }

    /// DER encoding of the root certificate.
    pub fn root_certificate_der(&self) -> &[u8] {
        &self.root_der
    }

    /// The issued certificate as a `CERTIFICATE` PEM block.
    pub fn certificate_pem(&self) -> String {
        codec::encode_pem(PEM_CERTIFICATE, &self.certificate_der)
    }

    /// The root certificate as a `ROOT_CERTIFICATE` PEM block.
    pub fn root_certificate_pem(&self) -> String {
        codec::encode_pem(PEM_ROOT_CERTIFICATE, &self.root_der)
    }

    /// Returns true if the leaf names the root's subject as its issuer.
    pub fn is_issued_by_root(&self) -> bool {
        self.certificate.tbs_certificate.issuer == self.root.tbs_certificate.subject
    }
}

/// A PKCS#10 request, the key pair behind it when held locally, and the
/// certificate issued for it once approved.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    key_pair: Option<RsaKeyPair>,
    request: CertReq,
    request_der: Vec<u8>,
    signed: Option<SignedCertificate>,
}

impl CertificateRequest {
    /// Wrap a CSR received from a peer. No private key is held.
    pub fn from_der(request_der: Vec<u8>) -> Result<Self> {
        let request = CertReq::from_der(&request_der)
            .map_err(|e| PkiError::csr(format!("Failed to parse CSR: {}", e)))?;
        Ok(Self {
            key_pair: None,
            request,
            request_der,
            signed: None,
        })
    }

    /// Wrap a CSR together with the key pair that signed it.
    pub fn with_key_pair(request_der: Vec<u8>, key_pair: RsaKeyPair) -> Result<Self> {
        let mut request = Self::from_der(request_der)?;
        if !key_pair.matches(&request.request.info.public_key)? {
            return Err(PkiError::KeyMismatch);
        }
        request.key_pair = Some(key_pair);
        Ok(request)
    }

    /// The parsed CSR.
    pub fn request(&self) -> &CertReq {
        &self.request
    }

    /// DER encoding of the CSR.
    pub fn request_der(&self) -> &[u8] {
        &self.request_der
    }

    /// The CSR as a `CERTIFICATE REQUEST` PEM block.
    pub fn request_pem(&self) -> String {
        codec::encode_pem(PEM_CERTIFICATE_REQUEST, &self.request_der)
    }

    /// The key pair, if this request was built locally.
    pub fn key_pair(&self) -> Option<&RsaKeyPair> {
        self.key_pair.as_ref()
    }

    /// The private key as an `RSA PRIVATE KEY` PEM block.
    pub fn private_key_pem(&self) -> Result<String> {
        let key_pair = self.key_pair.as_ref().ok_or(PkiError::NoPrivateKey)?;
        Ok(codec::encode_pem(
            PEM_RSA_PRIVATE_KEY,
            &key_pair.to_pkcs1_der()?,
        ))
    }

    /// The issued certificate, once approved.
    pub fn signed_certificate(&self) -> Option<&SignedCertificate> {
        self.signed.as_ref()
    }

    /// Consume the request, keeping only the issued certificate.
    pub fn into_signed_certificate(self) -> Option<SignedCertificate> {
        self.signed
    }

    /// Returns true once a certificate has been attached.
    pub fn is_approved(&self) -> bool {
        self.signed.is_some()
    }

    /// Attach the issued certificate. A request is approved at most once.
    pub(crate) fn attach(&mut self, signed: SignedCertificate) -> Result<()> {
        if self.signed.is_some() {
            return Err(PkiError::AlreadyApproved);
        }
        self.signed = Some(signed);
        Ok(())
    }
}

/// Builder for a fresh key pair and the CSR it signs.
///
/// CSRs are always signed with SHA-256 over RSA and never ask for CA rights.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    profile: CertificateProfile,
    key_strength: usize,
    alt_names: SubjectAltNames,
    excluded_dns: Vec<String>,
    permitted_dns: Vec<String>,
}

impl RequestBuilder {
    /// Create a builder for the given subject profile.
    pub fn new(profile: CertificateProfile) -> Self {
        Self {
            profile,
            key_strength: DEFAULT_KEY_STRENGTH,
            alt_names: SubjectAltNames::default(),
            excluded_dns: Vec::new(),
            permitted_dns: Vec::new(),
        }
    }

    /// Set the RSA modulus size.
    pub fn key_strength(mut self, bits: usize) -> Self {
        self.key_strength = bits;
        self
    }

    /// Add a DNS subject alternative name.
    pub fn san_dns(mut self, dns: impl Into<String>) -> Self {
        self.alt_names.dns_names.push(dns.into());
        self
    }

    /// Add an IP address subject alternative name.
    pub fn san_ip(mut self, ip: IpAddr) -> Self {
        self.alt_names.ip_addresses.push(ip);
        self
    }

    /// Add an email subject alternative name.
    pub fn san_email(mut self, email: impl Into<String>) -> Self {
        self.alt_names.emails.push(email.into());
        self
    }

    /// Request that a DNS subtree be excluded.
    pub fn exclude_dns(mut self, dns: impl Into<String>) -> Self {
        self.excluded_dns.push(dns.into());
        self
    }

    /// Request that names be restricted to a DNS subtree.
    pub fn permit_dns(mut self, dns: impl Into<String>) -> Self {
        self.permitted_dns.push(dns.into());
        self
    }

    /// Generate the key pair and sign the CSR with it.
    pub fn build(self) -> Result<CertificateRequest> {
        let key_pair = KeyPairFactory::new(self.key_strength)?.generate()?;
        self.build_with_key(key_pair)
    }

    /// Sign the CSR with an existing key pair.
    pub fn build_with_key(self, key_pair: RsaKeyPair) -> Result<CertificateRequest> {
        let signer = key_pair.to_rcgen()?;

        let mut params = CertificateParams::default();
        params.distinguished_name = self.profile.to_distinguished_name();
        params.subject_alt_names = self.alt_names.to_rcgen()?;
        if let Some(extension) = requested_name_constraints(&self.permitted_dns, &self.excluded_dns)? {
            params.custom_extensions.push(extension);
        }

        let csr = params
            .serialize_request(&signer)
            .map_err(|e| PkiError::csr(format!("Failed to serialize CSR: {}", e)))?;
        debug!(subject = %self.profile.common_name, "Created certificate request");

        CertificateRequest::with_key_pair(csr.der().to_vec(), key_pair)
    }
}

fn requested_name_constraints(
    permitted: &[String],
    excluded: &[String],
) -> Result<Option<CustomExtension>> {
    if permitted.is_empty() && excluded.is_empty() {
        return Ok(None);
    }

    let subtrees = |names: &[String]| -> Result<Option<Vec<GeneralSubtree>>> {
        if names.is_empty() {
            return Ok(None);
        }
        names
            .iter()
            .map(|name| -> Result<GeneralSubtree> {
                Ok(GeneralSubtree {
                    base: GeneralName::DnsName(Ia5String::new(name)?),
                    minimum: 0,
                    maximum: None,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    };

    let constraints = NameConstraints {
        permitted_subtrees: subtrees(permitted)?,
        excluded_subtrees: subtrees(excluded)?,
    };
    let mut extension =
        CustomExtension::from_oid_content(NAME_CONSTRAINTS_ARCS, constraints.to_der()?);
    extension.set_criticality(!permitted.is_empty());
    Ok(Some(extension))
}
