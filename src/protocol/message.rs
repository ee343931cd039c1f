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

//! Enrollment message grammar.
//!
//! Every line exchanged with a box has the form
//!
//! ```text
//! SECRET#IDENTITY OP [BODY...]
//! ```
//!
//! The parser scans the raw bytes strictly left to right. Runs of spaces
//! before the operation name and before the body are skipped; once the body
//! has started every byte is kept verbatim.

use subtle::ConstantTimeEq;

use crate::error::{PkiError, Result};

/// Longest accepted operation name.
pub const MAX_OP_NAME_LENGTH: usize = 20;

/// Client registration request.
pub const OP_REGISTER_CLIENT: &str = "REGCL";

/// Response to a client registration request.
pub const OP_REGISTER_CLIENT_RESPONSE: &str = "REGCLRES";

const HASH: u8 = b'#';
const SPACE: u8 = b' ';

/// One parsed enrollment line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentMessage {
    /// Shared secret prefix.
    pub secret: String,
    /// Sender identity.
    pub identity: String,
    /// Operation name.
    pub op: String,
    /// Operation payload, possibly empty.
    pub body: Vec<u8>,
    /// The line exactly as received.
    pub raw: Vec<u8>,
}

impl EnrollmentMessage {
    /// Render `secret#identity OP body` as raw bytes.
    pub fn format(secret: &str, identity: &str, op: &str, body: &[u8]) -> Vec<u8> {
        let mut line = format!("{}#{} {}", secret, identity, op).into_bytes();
        if !body.is_empty() {
            line.push(SPACE);
            line.extend_from_slice(body);
        }
        line
    }
}

/// Parses enrollment lines carrying a configured shared secret.
#[derive(Clone)]
pub struct MessageParser {
    secret: Vec<u8>,
}

impl std::fmt::Debug for MessageParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageParser").finish_non_exhaustive()
    }
}

impl MessageParser {
    /// Create a parser expecting `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    /// Parse one raw line.
    pub fn parse(&self, incoming: &[u8]) -> Result<EnrollmentMessage> {
        let mut scanner = Scanner::new(incoming);

        let secret = scanner.secret()?;
        if !bool::from(secret.ct_eq(&self.secret)) {
            return Err(PkiError::InvalidSecret);
        }
        let identity = scanner.identity()?;
        let op = scanner.op_name()?;
        let body = scanner.body();

        Ok(EnrollmentMessage {
            secret: String::from_utf8_lossy(secret).into_owned(),
            identity: String::from_utf8_lossy(identity).into_owned(),
            op: String::from_utf8_lossy(op).into_owned(),
            body: body.to_vec(),
            raw: incoming.to_vec(),
        })
    }
}

struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_spaces(&mut self) {
        while self.input.get(self.pos) == Some(&SPACE) {
            self.pos += 1;
        }
    }

    fn secret(&mut self) -> Result<&'a [u8]> {
        self.skip_spaces();
        let start = self.pos;
        loop {
            match self.input.get(self.pos) {
                None if self.pos == start => return Err(PkiError::SecretRequired),
                None => return Err(PkiError::InvalidMessage),
                Some(&HASH) => {
                    let secret = &self.input[start..self.pos];
                    self.pos += 1;
                    return Ok(secret);
                }
                Some(&SPACE) => return Err(PkiError::NoSecretHeader),
                Some(_) => self.pos += 1,
            }
        }
    }

    fn identity(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        loop {
            match self.input.get(self.pos) {
                None if self.pos == start => return Err(PkiError::NoIdentity),
                None => return Err(PkiError::InvalidMessage),
                Some(&SPACE) if self.pos == start => return Err(PkiError::NoIdentity),
                Some(&SPACE) => {
                    let identity = &self.input[start..self.pos];
                    self.pos += 1;
                    return Ok(identity);
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn op_name(&mut self) -> Result<&'a [u8]> {
        self.skip_spaces();
        let start = self.pos;
        while let Some(&byte) = self.input.get(self.pos) {
            if byte == SPACE {
                break;
            }
            self.pos += 1;
            if self.pos - start > MAX_OP_NAME_LENGTH {
                return Err(PkiError::InvalidOpName {
                    max: MAX_OP_NAME_LENGTH,
                });
            }
        }
        if self.pos == start {
            return Err(PkiError::NoOpName);
        }
        Ok(&self.input[start..self.pos])
    }

    fn body(&mut self) -> &'a [u8] {
        self.skip_spaces();
        &self.input[self.pos..]
    }
}
