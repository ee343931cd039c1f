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

//! Subject profiles and extended key usages.

use std::fmt;
use std::net::IpAddr;

use const_oid::ObjectIdentifier;
use rcgen::{DistinguishedName, DnType, ExtendedKeyUsagePurpose, SanType};
use serde::{Deserialize, Serialize};

use crate::error::{PkiError, Result};

/// Subject fields copied verbatim into issued certificates.
///
/// Empty fields are left out of the distinguished name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateProfile {
    /// Organization (O).
    pub organization: String,
    /// Country (C).
    pub country: String,
    /// State or province (ST).
    pub province: String,
    /// Locality (L).
    pub locality: String,
    /// Street address (street).
    pub street_address: String,
    /// Postal code.
    pub postal_code: String,
    /// Common name (CN).
    pub common_name: String,
}

impl CertificateProfile {
    /// Create a profile with only organization and common name set.
    pub fn new(organization: impl Into<String>, common_name: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            common_name: common_name.into(),
            ..Default::default()
        }
    }

    /// Set the country.
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    /// Set the state or province.
    pub fn province(mut self, province: impl Into<String>) -> Self {
        self.province = province.into();
        self
    }

    /// Set the locality.
    pub fn locality(mut self, locality: impl Into<String>) -> Self {
        self.locality = locality.into();
        self
    }

    /// Set the street address.
    pub fn street_address(mut self, street_address: impl Into<String>) -> Self {
        self.street_address = street_address.into();
        self
    }

    /// Set the postal code.
    pub fn postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = postal_code.into();
        self
    }

    pub(crate) fn to_distinguished_name(&self) -> DistinguishedName {
        let mut name = DistinguishedName::new();
        let fields = [
            (DnType::CountryName, &self.country),
            (DnType::OrganizationName, &self.organization),
            (DnType::LocalityName, &self.locality),
            (DnType::StateOrProvinceName, &self.province),
            // id-at-streetAddress
            (DnType::CustomDnType(vec![2, 5, 4, 9]), &self.street_address),
            // id-at-postalCode
            (DnType::CustomDnType(vec![2, 5, 4, 17]), &self.postal_code),
            (DnType::CommonName, &self.common_name),
        ];
        for (ty, value) in fields {
            if !value.is_empty() {
                name.push(ty, value.as_str());
            }
        }
        name
    }
}

/// Subject alternative names requested for a certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAltNames {
    /// DNS names.
    pub dns_names: Vec<String>,
    /// IP addresses.
    pub ip_addresses: Vec<IpAddr>,
    /// Email addresses.
    pub emails: Vec<String>,
}

impl SubjectAltNames {
    /// Returns true if no names are set.
    pub fn is_empty(&self) -> bool {
        self.dns_names.is_empty() && self.ip_addresses.is_empty() && self.emails.is_empty()
    }

    pub(crate) fn to_rcgen(&self) -> Result<Vec<SanType>> {
        let mut names = Vec::new();
        for dns in &self.dns_names {
            let value = dns
                .clone()
                .try_into()
                .map_err(|e| PkiError::certificate_build(format!("Invalid DNS name '{}': {}", dns, e)))?;
            names.push(SanType::DnsName(value));
        }
        for ip in &self.ip_addresses {
            names.push(SanType::IpAddress(*ip));
        }
        for email in &self.emails {
            let value = email.clone().try_into().map_err(|e| {
                PkiError::certificate_build(format!("Invalid email address '{}': {}", email, e))
            })?;
            names.push(SanType::Rfc822Name(value));
        }
        Ok(names)
    }
}

/// Extended key usage purposes understood by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtendedUsage {
    /// TLS server authentication.
    ServerAuth,
    /// TLS client authentication.
    ClientAuth,
    /// Code signing.
    CodeSigning,
    /// S/MIME email protection.
    EmailProtection,
    /// Trusted timestamping.
    TimeStamping,
    /// OCSP response signing.
    OcspSigning,
    /// Any extended key usage.
    Any,
}

impl ExtendedUsage {
    /// id-kp-serverAuth
    pub const SERVER_AUTH_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");
    /// id-kp-clientAuth
    pub const CLIENT_AUTH_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");
    /// id-kp-codeSigning
    pub const CODE_SIGNING_OID: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.3");
    /// id-kp-emailProtection
    pub const EMAIL_PROTECTION_OID: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.4");
    /// id-kp-timeStamping
    pub const TIME_STAMPING_OID: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.8");
    /// id-kp-OCSPSigning
    pub const OCSP_SIGNING_OID: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.9");
    /// anyExtendedKeyUsage
    pub const ANY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");

    /// Object identifier of this purpose.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            Self::ServerAuth => Self::SERVER_AUTH_OID,
            Self::ClientAuth => Self::CLIENT_AUTH_OID,
            Self::CodeSigning => Self::CODE_SIGNING_OID,
            Self::EmailProtection => Self::EMAIL_PROTECTION_OID,
            Self::TimeStamping => Self::TIME_STAMPING_OID,
            Self::OcspSigning => Self::OCSP_SIGNING_OID,
            Self::Any => Self::ANY_OID,
        }
    }

    /// Look up a purpose by object identifier.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [
            Self::ServerAuth,
            Self::ClientAuth,
            Self::CodeSigning,
            Self::EmailProtection,
            Self::TimeStamping,
            Self::OcspSigning,
            Self::Any,
        ]
        .into_iter()
        .find(|usage| usage.oid() == *oid)
    }

    pub(crate) fn to_rcgen(self) -> ExtendedKeyUsagePurpose {
        match self {
            Self::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            Self::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            Self::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
            Self::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
            Self::TimeStamping => ExtendedKeyUsagePurpose::TimeStamping,
            Self::OcspSigning => ExtendedKeyUsagePurpose::OcspSigning,
            Self::Any => ExtendedKeyUsagePurpose::Any,
        }
    }
}

impl fmt::Display for ExtendedUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ServerAuth => "serverAuth",
            Self::ClientAuth => "clientAuth",
            Self::CodeSigning => "codeSigning",
            Self::EmailProtection => "emailProtection",
            Self::TimeStamping => "timeStamping",
            Self::OcspSigning => "OCSPSigning",
            Self::Any => "anyExtendedKeyUsage",
        };
        f.write_str(name)
    }
}
