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

//! Self-signed root certificate authority.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use der::Decode;
use rcgen::{
    BasicConstraints, CertificateParams, GeneralSubtree, IsCa, KeyUsagePurpose, NameConstraints,
};
use time::OffsetDateTime;
use tracing::info;
use x509_cert::Certificate;

use super::codec;
use super::keys::{KeyPairFactory, RsaKeyPair};
use super::profile::{CertificateProfile, ExtendedUsage, SubjectAltNames};
use super::serial::{Serial, SerialNumberGenerator};
use super::verify::TrustPool;
use super::{DEFAULT_CA_LIFETIME, DEFAULT_KEY_STRENGTH, PEM_CERTIFICATE, PEM_RSA_PRIVATE_KEY};
use crate::error::{PkiError, Result};

/// Builder for a self-signed root authority.
///
/// # Example
///
/// ```no_run
/// use box_pki::certs::{CertificateProfile, RootAuthorityBuilder};
///
/// let authority = RootAuthorityBuilder::new(CertificateProfile::new("DreamBench", "box.local"))
///     .key_strength(4096)
///     .permit_dns("box.local")
///     .build()
///     .expect("Failed to build root authority");
/// assert!(authority.is_self_signed());
/// ```
#[derive(Debug, Clone)]
pub struct RootAuthorityBuilder {
    profile: CertificateProfile,
    key_strength: usize,
    lifetime: Duration,
    serials: SerialNumberGenerator,
    extended_usages: Vec<ExtendedUsage>,
    alt_names: SubjectAltNames,
    excluded_dns: Vec<String>,
    permitted_dns: Vec<String>,
}

impl RootAuthorityBuilder {
    /// Create a builder for the given subject profile.
    pub fn new(profile: CertificateProfile) -> Self {
        Self {
            profile,
            key_strength: DEFAULT_KEY_STRENGTH,
            lifetime: DEFAULT_CA_LIFETIME,
            serials: SerialNumberGenerator::default(),
            extended_usages: Vec::new(),
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

    /// Set how long the root stays valid.
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the serial number generator.
    pub fn serials(mut self, serials: SerialNumberGenerator) -> Self {
        self.serials = serials;
        self
    }

    /// Add an extended key usage on top of server and client authentication.
    pub fn extended_usage(mut self, usage: ExtendedUsage) -> Self {
        self.extended_usages.push(usage);
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

    /// Exclude a DNS subtree from every certificate this root issues.
    pub fn exclude_dns(mut self, dns: impl Into<String>) -> Self {
        self.excluded_dns.push(dns.into());
        self
    }

    /// Restrict issued certificates to a DNS subtree.
    pub fn permit_dns(mut self, dns: impl Into<String>) -> Self {
        self.permitted_dns.push(dns.into());
        self
    }

    /// Generate the key pair and self-sign the root certificate.
    pub fn build(self) -> Result<RootAuthority> {
        let key_pair = KeyPairFactory::new(self.key_strength)?.generate()?;
        let signer = key_pair.to_rcgen()?;
        let serial = self.serials.generate();

        let mut params = CertificateParams::default();
        params.distinguished_name = self.profile.to_distinguished_name();
        params.serial_number = Some(rcgen::SerialNumber::from_slice(serial.as_bytes()));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let (not_before, not_after) = validity_window(self.lifetime)?;
        params.not_before = not_before;
        params.not_after = not_after;
        params.key_usages = vec![
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
        ];

        let mut usages = vec![ExtendedUsage::ServerAuth, ExtendedUsage::ClientAuth];
        for usage in self.extended_usages {
            if !usages.contains(&usage) {
                usages.push(usage);
            }
        }
        params.extended_key_usages = usages.into_iter().map(ExtendedUsage::to_rcgen).collect();
        params.subject_alt_names = self.alt_names.to_rcgen()?;

        if !self.permitted_dns.is_empty() || !self.excluded_dns.is_empty() {
            params.name_constraints = Some(NameConstraints {
                permitted_subtrees: self
                    .permitted_dns
                    .into_iter()
                    .map(GeneralSubtree::DnsName)
                    .collect(),
                excluded_subtrees: self
                    .excluded_dns
                    .into_iter()
                    .map(GeneralSubtree::DnsName)
                    .collect(),
            });
        }

        let certificate = params
            .self_signed(&signer)
            .map_err(|e| PkiError::certificate_build(format!("Failed to self-sign root: {}", e)))?;

        let authority = RootAuthority::from_parts(certificate.der().to_vec(), key_pair)?;
        info!(
            serial = %serial,
            subject = %authority.certificate().tbs_certificate.subject,
            "Created root authority"
        );
        Ok(authority)
    }
}

/// A root certificate together with the private key that signed it.
#[derive(Debug, Clone)]
pub struct RootAuthority {
    key_pair: RsaKeyPair,
    certificate: Arc<Certificate>,
    certificate_der: Vec<u8>,
}

impl RootAuthority {
    /// Assemble an authority from a DER certificate and its private key.
    ///
    /// The certificate is parsed so derived fields are always consistent with
    /// the DER bytes, and the key must carry the certificate's public key.
    pub fn from_parts(certificate_der: Vec<u8>, key_pair: RsaKeyPair) -> Result<Self> {
        let certificate = Certificate::from_der(&certificate_der)
            .map_err(|e| PkiError::certificate_parsing(format!("Failed to parse root: {}", e)))?;
        if !key_pair.matches(&certificate.tbs_certificate.subject_public_key_info)? {
            return Err(PkiError::KeyMismatch);
        }
        Ok(Self {
            key_pair,
            certificate: Arc::new(certificate),
            certificate_der,
        })
    }

    /// The parsed root certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// A shared handle on the root certificate for issued certificates to refer back to.
    pub fn shared_certificate(&self) -> Arc<Certificate> {
        Arc::clone(&self.certificate)
    }

    /// DER encoding of the root certificate.
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// The root's key pair.
    pub fn key_pair(&self) -> &RsaKeyPair {
        &self.key_pair
    }

    /// The root certificate as a `CERTIFICATE` PEM block.
    pub fn certificate_pem(&self) -> String {
        codec::encode_pem(PEM_CERTIFICATE, &self.certificate_der)
    }

    /// The private key as an `RSA PRIVATE KEY` PEM block.
    pub fn private_key_pem(&self) -> Result<String> {
        Ok(codec::encode_pem(
            PEM_RSA_PRIVATE_KEY,
            &self.key_pair.to_pkcs1_der()?,
        ))
    }

    /// Serial number of the root certificate.
    pub fn serial(&self) -> Serial {
        Serial::from_be_bytes(self.certificate.tbs_certificate.serial_number.as_bytes())
    }

    /// Returns true if issuer and subject are the same name.
    pub fn is_self_signed(&self) -> bool {
        self.certificate.tbs_certificate.issuer == self.certificate.tbs_certificate.subject
    }

    /// A trust pool holding only this root.
    pub fn trust_pool(&self) -> TrustPool {
        TrustPool::new(vec![self.shared_certificate()])
    }
}

/// `(now, now + lifetime)` as `time` values for `rcgen`.
pub(crate) fn validity_window(lifetime: Duration) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let not_before = OffsetDateTime::now_utc();
    let lifetime = time::Duration::try_from(lifetime)
        .map_err(|e| PkiError::certificate_build(format!("Invalid lifetime: {}", e)))?;
    let not_after = not_before
        .checked_add(lifetime)
        .ok_or_else(|| PkiError::certificate_build("Certificate lifetime overflows"))?;
    Ok((not_before, not_after))
}
