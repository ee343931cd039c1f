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

//! Daemon configuration.
//!
//! The configuration file is TOML. Every section and field is optional:
//!
//! ```toml
//! [box]
//! company = "DreamBench"
//! server_name = "box.local"
//! store_path = "/var/lib/box"
//!
//! [issuance]
//! key_strength = 4096
//! serial_bits = 128
//! ca_lifetime_days = 1825
//! certificate_lifetime_days = 365
//!
//! [server]
//! listen = "127.0.0.1:7450"
//! max_message_bytes = 65536
//!
//! [logging]
//! level = "info"
//! ```
//!
//! The shared secret is deliberately absent; it is passed on the command line
//! or through `BOX_SECRET`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::certs::keys::MIN_KEY_STRENGTH;
use crate::certs::serial::MAX_SERIAL_BITS;
use crate::certs::{SerialNumberGenerator, SigningEngine, DEFAULT_KEY_STRENGTH};
use crate::error::{PkiError, Result};
use crate::logging::LoggingConfig;
use crate::protocol::transport::{DEFAULT_MAX_MESSAGE_BYTES, MIN_MESSAGE_BYTES};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoxConfig {
    /// Identity of the box.
    #[serde(default, rename = "box")]
    pub identity: BoxSection,

    /// Certificate issuance parameters.
    #[serde(default)]
    pub issuance: IssuanceConfig,

    /// Enrollment listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BoxConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| PkiError::config(format!("Invalid TOML: {e}")))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PkiError::config(format!("TOML serialize: {e}")))
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            PkiError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, reporting all violations at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.identity.company.trim().is_empty() {
            errors.push("box.company must not be empty".to_string());
        }
        if self.identity.store_path.as_os_str().is_empty() {
            errors.push("box.store_path must not be empty".to_string());
        }

        if self.issuance.key_strength < MIN_KEY_STRENGTH {
            errors.push(format!(
                "issuance.key_strength must be at least {}",
                MIN_KEY_STRENGTH
            ));
        }
        if self.issuance.serial_bits == 0 || self.issuance.serial_bits > MAX_SERIAL_BITS {
            errors.push(format!(
                "issuance.serial_bits must be between 1 and {}",
                MAX_SERIAL_BITS
            ));
        }
        if self.issuance.ca_lifetime_days == 0 {
            errors.push("issuance.ca_lifetime_days must be > 0".to_string());
        }
        if self.issuance.certificate_lifetime_days == 0 {
            errors.push("issuance.certificate_lifetime_days must be > 0".to_string());
        }

        if self.server.max_message_bytes < MIN_MESSAGE_BYTES {
            errors.push(format!(
                "server.max_message_bytes must be at least {}",
                MIN_MESSAGE_BYTES
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PkiError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Identity of the box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoxSection {
    /// Organization placed in certificate subjects.
    #[serde(default = "default_company")]
    pub company: String,

    /// Host name placed in certificate subjects. Empty means `*`.
    #[serde(default)]
    pub server_name: String,

    /// Directory holding the boxfile and certificate material.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for BoxSection {
    fn default() -> Self {
        Self {
            company: default_company(),
            server_name: String::new(),
            store_path: default_store_path(),
        }
    }
}

fn default_company() -> String {
    "box".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("box-data")
}

/// Certificate issuance parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuanceConfig {
    /// RSA modulus size in bits.
    #[serde(default = "default_key_strength")]
    pub key_strength: usize,

    /// Random serial number size in bits.
    #[serde(default = "default_serial_bits")]
    pub serial_bits: usize,

    /// Root certificate lifetime in days.
    #[serde(default = "default_ca_lifetime_days")]
    pub ca_lifetime_days: u64,

    /// Issued certificate lifetime in days.
    #[serde(default = "default_certificate_lifetime_days")]
    pub certificate_lifetime_days: u64,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            key_strength: default_key_strength(),
            serial_bits: default_serial_bits(),
            ca_lifetime_days: default_ca_lifetime_days(),
            certificate_lifetime_days: default_certificate_lifetime_days(),
        }
    }
}

impl IssuanceConfig {
    /// Root certificate lifetime.
    pub fn ca_lifetime(&self) -> Duration {
        Duration::from_secs(self.ca_lifetime_days * SECONDS_PER_DAY)
    }

    /// Issued certificate lifetime.
    pub fn certificate_lifetime(&self) -> Duration {
        Duration::from_secs(self.certificate_lifetime_days * SECONDS_PER_DAY)
    }

    /// Serial generator for the configured size.
    pub fn serials(&self) -> SerialNumberGenerator {
        SerialNumberGenerator::new(self.serial_bits)
    }

    /// Signing engine issuing with these parameters.
    pub fn signing_engine(&self) -> SigningEngine {
        SigningEngine::new(self.serials(), self.certificate_lifetime())
    }
}

fn default_key_strength() -> usize {
    DEFAULT_KEY_STRENGTH
}

fn default_serial_bits() -> usize {
    crate::certs::serial::DEFAULT_SERIAL_BITS
}

fn default_ca_lifetime_days() -> u64 {
    5 * 365
}

fn default_certificate_lifetime_days() -> u64 {
    365
}

/// Enrollment listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Largest accepted line in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7450))
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}
