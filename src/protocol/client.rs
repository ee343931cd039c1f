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

//! Enrollment client.
//!
//! Sends a CSR to a box with `REGCL` and turns the `REGCLRES` answer back
//! into an approved [`CertificateRequest`].

use std::io;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, info, warn};

use super::message::{EnrollmentMessage, MessageParser, OP_REGISTER_CLIENT, OP_REGISTER_CLIENT_RESPONSE};
use super::transport::MessageTransport;
use crate::certs::{CertificateRequest, KeyUsagePolicy};
use crate::error::{PkiError, Result};

/// Outcome of a registration.
#[derive(Debug)]
pub enum EnrollmentResponse {
    /// The box issued a certificate; the request now carries it.
    Issued(CertificateRequest),
    /// The box refused, with its reason.
    Rejected(String),
}

impl EnrollmentResponse {
    /// Returns true if a certificate was issued.
    pub fn is_issued(&self) -> bool {
        matches!(self, Self::Issued(_))
    }
}

/// Client side of the enrollment protocol.
#[derive(Debug)]
pub struct EnrollmentClient<T> {
    transport: T,
    parser: MessageParser,
    secret: String,
    identity: String,
}

impl<T: MessageTransport> EnrollmentClient<T> {
    /// Talk to a box over `transport`, introducing ourselves as `identity`.
    pub fn new(transport: T, secret: impl Into<String>, identity: impl Into<String>) -> Self {
        let secret = secret.into();
        Self {
            transport,
            parser: MessageParser::new(secret.clone()),
            secret,
            identity: identity.into(),
        }
    }

    /// Ask the box to sign `request`.
    ///
    /// An issued certificate is verified against the root shipped with it
    /// and attached to `request`, which keeps its private key.
    pub async fn register(&mut self, mut request: CertificateRequest) -> Result<EnrollmentResponse> {
        let body = STANDARD.encode(request.request_der());
        let line = EnrollmentMessage::format(
            &self.secret,
            &self.identity,
            OP_REGISTER_CLIENT,
            body.as_bytes(),
        );
        debug!(identity = %self.identity, "Sending client registration");
        self.transport.write_message(&line).await?;
        self.transport.flush().await?;

        let raw = self.read_response().await?;
        let response = self.parser.parse(&raw)?;
        if response.op != OP_REGISTER_CLIENT_RESPONSE {
            return Err(PkiError::UnexpectedResponse(format!(
                "expected {} but got {}",
                OP_REGISTER_CLIENT_RESPONSE, response.op
            )));
        }

        if let Some(payload) = response.body.strip_prefix(b"+OK ") {
            let issued = CertificateRequest::from_raw(&STANDARD.decode(payload)?)?;
            if issued.request_der() != request.request_der() {
                return Err(PkiError::UnexpectedResponse(
                    "certificate was issued for a different request".to_string(),
                ));
            }
            let signed = issued
                .into_signed_certificate()
                .ok_or(PkiError::NoCertificate)?;
            request.validate_and_accept(signed, KeyUsagePolicy::ServerOnly)?;
            info!(server = %response.identity, "Registration approved");
            Ok(EnrollmentResponse::Issued(request))
        } else if let Some(reason) = response.body.strip_prefix(b"+ERR") {
            let reason = String::from_utf8_lossy(reason).trim().to_string();
            warn!(server = %response.identity, %reason, "Registration rejected");
            Ok(EnrollmentResponse::Rejected(reason))
        } else {
            Err(PkiError::UnexpectedResponse(format!(
                "malformed {} body",
                OP_REGISTER_CLIENT_RESPONSE
            )))
        }
    }

    /// Unwrap the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    async fn read_response(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.transport.read_message().await {
                Ok(Some(raw)) => return Ok(raw),
                Ok(None) => {
                    return Err(PkiError::UnexpectedResponse(
                        "connection closed before a response arrived".to_string(),
                    ))
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                    continue
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
