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

//! # box-pki
//!
//! A private certificate authority for self-hosted boxes, together with the
//! line based protocol clients use to enroll with a box.
//!
//! ## Overview
//!
//! - [`certs`] mints the root authority, builds CSRs, approves them under a
//!   key usage policy and verifies the result
//! - [`certs::codec`] packs authorities and approved requests into compact
//!   length prefixed bundles
//! - [`certs::store`] persists them under fixed names
//! - [`protocol`] speaks `SECRET#IDENTITY OP BODY` lines over any tokio stream
//! - [`controller`] bootstraps a box: profile, root and server identity
//!
//! ## Example
//!
//! ```no_run
//! use box_pki::certs::{CertificateProfile, RequestBuilder, RootAuthorityBuilder, SigningEngine};
//!
//! # fn example() -> box_pki::Result<()> {
//! let authority = RootAuthorityBuilder::new(CertificateProfile::new("DreamBench", "box.local"))
//!     .build()?;
//!
//! let mut request = RequestBuilder::new(CertificateProfile::new("DreamBench", "client.box.local"))
//!     .san_dns("client.box.local")
//!     .build()?;
//!
//! SigningEngine::default().approve_client(&authority, &mut request)?;
//! assert!(request.is_approved());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod certs;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod protocol;

pub use config::BoxConfig;
pub use controller::{BoxController, BoxProfile};
pub use error::{PkiError, Result};

pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
