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

//! Private certificate authority.
//!
//! This module covers the whole certificate lifecycle of a box:
//!
//! - [`SerialNumberGenerator`] draws random certificate serials
//! - [`RsaKeyPair`] generates and encodes RSA key material
//! - [`RootAuthorityBuilder`] mints the self-signed root
//! - [`RequestBuilder`] creates key pairs with their CSRs
//! - [`SigningEngine`] approves CSRs under a [`KeyUsagePolicy`]
//! - [`TrustPool`] verifies leaves against the root
//! - [`codec`] packs authorities and approved requests into raw bundles
//! - [`store`] persists them under fixed names

pub mod authority;
pub mod codec;
pub mod keys;
pub mod profile;
pub mod request;
pub mod serial;
pub mod signing;
pub mod store;
pub mod verify;

use std::time::Duration;

pub use authority::{RootAuthority, RootAuthorityBuilder};
pub use keys::{KeyPairFactory, RsaKeyPair};
pub use profile::{CertificateProfile, ExtendedUsage, SubjectAltNames};
pub use request::{CertificateRequest, RequestBuilder, SignedCertificate};
pub use serial::{Serial, SerialNumberGenerator};
pub use signing::{KeyUsagePolicy, SigningEngine};
pub use store::{DirectoryStore, MemoryStore, PersistenceStore, ScopedStore};
pub use verify::TrustPool;

/// RSA modulus size used for box keys.
pub const DEFAULT_KEY_STRENGTH: usize = 4096;

/// Lifetime of certificates issued to clients and servers.
pub const DEFAULT_CERTIFICATE_LIFETIME: Duration = Duration::from_secs(8760 * 60 * 60);

/// Lifetime of the root authority.
pub const DEFAULT_CA_LIFETIME: Duration = Duration::from_secs(5 * 8760 * 60 * 60);

/// PEM tag for certificates.
pub const PEM_CERTIFICATE: &str = "CERTIFICATE";

/// PEM tag for the root certificate shipped alongside an issued certificate.
pub const PEM_ROOT_CERTIFICATE: &str = "ROOT_CERTIFICATE";

/// PEM tag for PKCS#1 RSA private keys.
pub const PEM_RSA_PRIVATE_KEY: &str = "RSA PRIVATE KEY";

/// PEM tag for PKCS#10 requests.
pub const PEM_CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";
