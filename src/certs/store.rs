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

//! Persistence of certificate material.
//!
//! The authority only needs a name to bytes capability from its storage.
//! [`MemoryStore`] keeps everything in process, [`DirectoryStore`] writes one
//! file per name, and [`ScopedStore`] prefixes names so several identities
//! can share one backing store.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::authority::RootAuthority;
use super::codec::decode_pem;
use super::keys::RsaKeyPair;
use super::request::{CertificateRequest, SignedCertificate};
use super::{PEM_CERTIFICATE, PEM_CERTIFICATE_REQUEST, PEM_ROOT_CERTIFICATE, PEM_RSA_PRIVATE_KEY};
use crate::error::{PkiError, Result};

/// Fixed names under which certificate material is stored.
pub mod names {
    /// Root certificate.
    pub const ROOT_CERTIFICATE: &str = "ca.cert";
    /// Root private key.
    pub const ROOT_KEY: &str = "ca.key";
    /// Certificate issued for a request.
    pub const REQUEST_CERTIFICATE: &str = "req_ca.cert";
    /// Private key of a request.
    pub const REQUEST_KEY: &str = "req_ca.key";
    /// Root certificate that issued a request's certificate.
    pub const REQUEST_ROOT_CERTIFICATE: &str = "req_root_ca.cert";
    /// The CSR itself.
    pub const REQUEST_CSR: &str = "req_ca.csr";
}

/// A name to bytes store.
pub trait PersistenceStore: Send + Sync {
    /// Store `data` under `name`, replacing any previous value.
    fn persist(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Fetch the value stored under `name`.
    ///
    /// Returns [`PkiError::NotFound`] when nothing is stored there.
    fn retrieve(&self, name: &str) -> Result<Vec<u8>>;
}

/// In-process store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceStore for MemoryStore {
    fn persist(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| PkiError::Io(io::Error::other("memory store lock poisoned")))?;
        items.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn retrieve(&self, name: &str) -> Result<Vec<u8>> {
        let items = self
            .items
            .read()
            .map_err(|_| PkiError::Io(io::Error::other("memory store lock poisoned")))?;
        items.get(name).cloned().ok_or_else(|| PkiError::not_found(name))
    }
}

/// Store writing one file per name below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A store rooted at a subdirectory of this one.
    pub fn within(&self, sub: &str) -> Result<Self> {
        Ok(Self {
            root: self.path_for(sub)?,
        })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let normal = !name.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !normal {
            return Err(PkiError::config(format!("invalid store name '{}'", name)));
        }
        Ok(self.root.join(relative))
    }
}

impl PersistenceStore for DirectoryStore {
    fn persist(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %path.display(), "Persisted item");
        Ok(())
    }

    fn retrieve(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(PkiError::not_found(name)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Prefixes every name with `scope/` before handing it to the inner store.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn PersistenceStore>,
    scope: String,
}

impl ScopedStore {
    /// Scope `inner` under `scope`.
    pub fn new(inner: Arc<dyn PersistenceStore>, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scope: scope.into(),
        }
    }

    fn scoped(&self, name: &str) -> String {
        format!("{}/{}", self.scope, name)
    }
}

impl PersistenceStore for ScopedStore {
    fn persist(&self, name: &str, data: &[u8]) -> Result<()> {
        self.inner.persist(&self.scoped(name), data)
    }

    fn retrieve(&self, name: &str) -> Result<Vec<u8>> {
        self.inner
            .retrieve(&self.scoped(name))
            .map_err(|e| match e {
                PkiError::NotFound(_) => PkiError::not_found(self.scoped(name)),
                other => other,
            })
    }
}

impl RootAuthority {
    /// Store the root certificate and key under their fixed names.
    pub fn persist<S: PersistenceStore + ?Sized>(&self, store: &S) -> Result<()> {
        store.persist(names::ROOT_CERTIFICATE, self.certificate_pem().as_bytes())?;
        store.persist(names::ROOT_KEY, self.private_key_pem()?.as_bytes())?;
        Ok(())
    }

    /// Load a root authority stored by [`RootAuthority::persist`].
    pub fn load<S: PersistenceStore + ?Sized>(store: &S) -> Result<Self> {
        let cert = decode_pem(&store.retrieve(names::ROOT_CERTIFICATE)?, PEM_CERTIFICATE)?;
        let key = decode_pem(&store.retrieve(names::ROOT_KEY)?, PEM_RSA_PRIVATE_KEY)?;
        RootAuthority::from_parts(cert, RsaKeyPair::from_pkcs1_der(&key)?)
    }
}

impl CertificateRequest {
    /// Store an approved request with its key, certificate and root.
    pub fn persist<S: PersistenceStore + ?Sized>(&self, store: &S) -> Result<()> {
        let signed = self.signed_certificate().ok_or(PkiError::NoCertificate)?;
        let key = self.private_key_pem()?;

        store.persist(names::REQUEST_CSR, self.request_pem().as_bytes())?;
        store.persist(names::REQUEST_KEY, key.as_bytes())?;
        store.persist(names::REQUEST_CERTIFICATE, signed.certificate_pem().as_bytes())?;
        store.persist(
            names::REQUEST_ROOT_CERTIFICATE,
            signed.root_certificate_pem().as_bytes(),
        )?;
        Ok(())
    }

    /// Load a request stored by [`CertificateRequest::persist`].
    pub fn load<S: PersistenceStore + ?Sized>(store: &S) -> Result<Self> {
        let csr = decode_pem(&store.retrieve(names::REQUEST_CSR)?, PEM_CERTIFICATE_REQUEST)?;
        let key = decode_pem(&store.retrieve(names::REQUEST_KEY)?, PEM_RSA_PRIVATE_KEY)?;
        let cert = decode_pem(&store.retrieve(names::REQUEST_CERTIFICATE)?, PEM_CERTIFICATE)?;
        let root = decode_pem(
            &store.retrieve(names::REQUEST_ROOT_CERTIFICATE)?,
            PEM_ROOT_CERTIFICATE,
        )?;

        let mut request = CertificateRequest::with_key_pair(csr, RsaKeyPair::from_pkcs1_der(&key)?)?;
        request.attach(SignedCertificate::from_der(&cert, &root)?)?;
        Ok(request)
    }
}
