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

//! Random certificate serial numbers.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

/// Serial bit length used when none is configured.
pub const DEFAULT_SERIAL_BITS: usize = 128;

/// Largest bit length that still fits the 20 octet serial limit of RFC 5280
/// once the sign bit is accounted for.
pub const MAX_SERIAL_BITS: usize = 159;

/// A non-negative certificate serial number as big-endian bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Serial(Vec<u8>);

impl Serial {
    /// Create a serial from big-endian bytes, dropping redundant leading zeros.
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let start = bytes
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(bytes.len().saturating_sub(1));
        let trimmed = if bytes.is_empty() { &[0u8][..] } else { &bytes[start..] };
        Self(trimmed.to_vec())
    }

    /// Big-endian magnitude bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of significant bits.
    pub fn bit_len(&self) -> usize {
        match self.0.first() {
            Some(0) | None => 0,
            Some(top) => (self.0.len() - 1) * 8 + (8 - top.leading_zeros() as usize),
        }
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Draws serial numbers uniformly from `[0, 2^bits)` using the OS CSPRNG.
///
/// The generator holds no state beyond its bit length, so a single instance
/// can be shared freely between tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialNumberGenerator {
    bits: usize,
}

impl Default for SerialNumberGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SERIAL_BITS)
    }
}

impl SerialNumberGenerator {
    /// Create a generator for `bits` bit serials; zero selects the default of 128.
    pub fn new(bits: usize) -> Self {
        let bits = if bits == 0 { DEFAULT_SERIAL_BITS } else { bits };
        Self { bits }
    }

    /// Configured bit length.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Draw a fresh serial number.
    pub fn generate(&self) -> Serial {
        let len = self.bits.div_ceil(8);
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);

        let spare = len * 8 - self.bits;
        if spare > 0 {
            bytes[0] &= 0xff >> spare;
        }
        Serial::from_be_bytes(&bytes)
    }
}
