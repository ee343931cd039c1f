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

//! Box bootstrap.
//!
//! A box keeps three things in its store:
//!
//! - `boxfile`, a small TOML profile with the box id, root serial, company
//!   and server name (never the secret)
//! - the root authority under `ca/`
//! - the server's own certificate request under `ca_server/`
//!
//! [`BoxController::load_configuration`] loads whatever exists and creates
//! the rest.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::certs::{
    CertificateProfile, CertificateRequest, ExtendedUsage, PersistenceStore, RequestBuilder,
    RootAuthority, RootAuthorityBuilder, ScopedStore,
};
use crate::config::IssuanceConfig;
use crate::error::{PkiError, Result};
use crate::protocol::EnrollmentContext;

/// Name of the box profile in the store.
pub const BOXFILE: &str = "boxfile";

/// Scope holding the root authority.
pub const CA_SCOPE: &str = "ca";

/// Scope holding the server's certificate request.
pub const SERVER_SCOPE: &str = "ca_server";

/// Server name used when none is configured.
pub const DEFAULT_SERVER_NAME: &str = "*";

/// Persisted box profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxProfile {
    /// Unique box id, also the identity the server answers with.
    pub id: String,
    /// Serial of the current root certificate.
    #[serde(default)]
    pub serial: String,
    /// Organization in certificate subjects.
    #[serde(default)]
    pub company: String,
    /// Common name in certificate subjects.
    #[serde(default, rename = "serverName")]
    pub server_name: String,
}

impl BoxProfile {
    fn from_toml(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| PkiError::config(format!("boxfile is not UTF-8: {e}")))?;
        toml::from_str(text).map_err(|e| PkiError::config(format!("Invalid boxfile: {e}")))
    }

    fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| PkiError::config(format!("boxfile serialize: {e}")))
    }

    /// Take the values present in `loaded`, keeping ours where it has none.
    fn merge(&mut self, loaded: BoxProfile) {
        self.id = loaded.id;
        self.serial = loaded.serial;
        if !loaded.company.is_empty() {
            self.company = loaded.company;
        }
        if !loaded.server_name.is_empty() {
            self.server_name = loaded.server_name;
        }
    }

    fn certificate_profile(&self) -> CertificateProfile {
        CertificateProfile::new(self.company.clone(), self.server_name.clone())
    }
}

/// Owns the identity and certificate material of one box.
pub struct BoxController {
    secret: String,
    profile: BoxProfile,
    issuance: IssuanceConfig,
    store: Arc<dyn PersistenceStore>,
    authority: Option<Arc<RootAuthority>>,
    server_identity: Option<CertificateRequest>,
}

impl fmt::Debug for BoxController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxController")
            .field("profile", &self.profile)
            .field("issuance", &self.issuance)
            .field("authority", &self.authority.is_some())
            .field("server_identity", &self.server_identity.is_some())
            .finish_non_exhaustive()
    }
}

impl BoxController {
    /// Create a controller. An empty `server_name` becomes `*`.
    pub fn new(
        secret: impl Into<String>,
        company: impl Into<String>,
        server_name: impl Into<String>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        let mut server_name = server_name.into();
        if server_name.is_empty() {
            server_name = DEFAULT_SERVER_NAME.to_string();
        }
        Self {
            secret: secret.into(),
            profile: BoxProfile {
                company: company.into(),
                server_name,
                ..BoxProfile::default()
            },
            issuance: IssuanceConfig::default(),
            store,
            authority: None,
            server_identity: None,
        }
    }

    /// Use `issuance` for keys, serials and lifetimes.
    pub fn with_issuance(mut self, issuance: IssuanceConfig) -> Self {
        self.issuance = issuance;
        self
    }

    /// The box profile.
    pub fn profile(&self) -> &BoxProfile {
        &self.profile
    }

    /// The root authority, once loaded.
    pub fn authority(&self) -> Option<&RootAuthority> {
        self.authority.as_deref()
    }

    /// The server's approved request, once loaded.
    pub fn server_identity(&self) -> Option<&CertificateRequest> {
        self.server_identity.as_ref()
    }

    /// Load the boxfile, root authority and server identity, creating any
    /// that are missing.
    pub fn load_configuration(&mut self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(PkiError::SecretRequired);
        }

        match self.store.retrieve(BOXFILE) {
            Ok(data) => {
                let loaded = BoxProfile::from_toml(&data)?;
                self.profile.merge(loaded);
                debug!(box_id = %self.profile.id, "Loaded boxfile");
            }
            Err(e) if e.is_not_found() => {
                self.profile.id = Uuid::new_v4().to_string();
                self.save_profile()?;
                info!(box_id = %self.profile.id, "Created boxfile");
            }
            Err(e) => return Err(e),
        }

        let minted = self.load_authority()?;
        self.load_server_identity(minted)
    }

    /// Approve a client request for server authentication.
    pub fn sign_client_request(&self, request: &mut CertificateRequest) -> Result<()> {
        let authority = self.authority.as_ref().ok_or(PkiError::NoRootCertificate)?;
        self.issuance
            .signing_engine()
            .approve_server(authority, request)
    }

    /// State shared by enrollment connections.
    pub fn enrollment_context(&self) -> Result<EnrollmentContext> {
        let authority = self.authority.clone().ok_or(PkiError::NoRootCertificate)?;
        Ok(EnrollmentContext::new(
            self.secret.clone(),
            self.profile.id.clone(),
            authority,
            self.issuance.signing_engine(),
        ))
    }

    fn save_profile(&self) -> Result<()> {
        self.store.persist(BOXFILE, self.profile.to_toml()?.as_bytes())
    }

    /// Returns true when a new root was minted.
    fn load_authority(&mut self) -> Result<bool> {
        let scope = ScopedStore::new(Arc::clone(&self.store), CA_SCOPE);
        let (authority, minted) = match RootAuthority::load(&scope) {
            Ok(authority) => (authority, false),
            Err(e) if e.is_not_found() => {
                let authority = RootAuthorityBuilder::new(self.profile.certificate_profile())
                    .key_strength(self.issuance.key_strength)
                    .lifetime(self.issuance.ca_lifetime())
                    .serials(self.issuance.serials())
                    .build()?;
                authority.persist(&scope)?;
                (authority, true)
            }
            Err(e) => return Err(e),
        };

        let serial = authority.serial().to_string();
        if minted || self.profile.serial != serial {
            self.profile.serial = serial;
            self.save_profile()?;
        }
        info!(box_id = %self.profile.id, serial = %self.profile.serial, minted, "Root authority ready");

        self.authority = Some(Arc::new(authority));
        Ok(minted)
    }

    fn load_server_identity(&mut self, reissue: bool) -> Result<()> {
        let authority = self.authority.clone().ok_or(PkiError::NoRootCertificate)?;
        let scope = ScopedStore::new(Arc::clone(&self.store), SERVER_SCOPE);

        if !reissue {
            match CertificateRequest::load(&scope) {
                Ok(identity) => match check_server_identity(&authority, &identity) {
                    Ok(()) => {
                        debug!(box_id = %self.profile.id, "Loaded server identity");
                        self.server_identity = Some(identity);
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(box_id = %self.profile.id, error = %e, "Stored server identity is no longer valid");
                    }
                },
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let mut builder = RequestBuilder::new(self.profile.certificate_profile())
            .key_strength(self.issuance.key_strength);
        if self.profile.server_name != DEFAULT_SERVER_NAME {
            builder = builder.san_dns(self.profile.server_name.clone());
        }
        let mut identity = builder.build()?;
        self.issuance
            .signing_engine()
            .approve_server(&authority, &mut identity)?;
        identity.persist(&scope)?;
        info!(box_id = %self.profile.id, "Issued server identity");

        self.server_identity = Some(identity);
        Ok(())
    }
}

/// A stored identity is kept only while the current root still vouches for it.
fn check_server_identity(authority: &RootAuthority, identity: &CertificateRequest) -> Result<()> {
    let signed = identity.signed_certificate().ok_or(PkiError::NoCertificate)?;
    if signed.root_certificate_der() != authority.certificate_der() {
        return Err(PkiError::verification("issued by another root"));
    }
    authority
        .trust_pool()
        .verify(signed.certificate(), &[ExtendedUsage::ServerAuth])
}
