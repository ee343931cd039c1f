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

//! Integration tests for the raw bundle codec

use box_pki::certs::{CertificateRequest, RootAuthority, SigningEngine};
use box_pki::PkiError;

use crate::integration::{client_request, root};

fn approved() -> CertificateRequest {
    let mut request = client_request("codec.box.local");
    SigningEngine::default()
        .approve_server(&root(), &mut request)
        .unwrap();
    request
}

#[test]
fn test_root_bundle_roundtrip() {
    let root = root();
    let raw = root.to_raw().unwrap();

    let total = u16::from_le_bytes([raw[0], raw[1]]) as usize;
    assert_eq!(total, raw.len() - 2);

    let decoded = RootAuthority::from_raw(&raw).unwrap();
    assert_eq!(decoded.certificate_der(), root.certificate_der());
    assert_eq!(
        decoded.private_key_pem().unwrap(),
        root.private_key_pem().unwrap()
    );
}

#[test]
fn test_request_bundle_roundtrip() {
    let request = approved();
    let raw = request.to_raw().unwrap();

    let csr_len = u16::from_le_bytes([raw[2], raw[3]]) as usize;
    assert_eq!(csr_len, request.request_der().len());
    assert_eq!(&raw[8..8 + csr_len], request.request_der());

    let decoded = CertificateRequest::from_raw(&raw).unwrap();
    assert_eq!(decoded.request_der(), request.request_der());
    let signed = decoded.signed_certificate().unwrap();
    let original = request.signed_certificate().unwrap();
    assert_eq!(signed.certificate_der(), original.certificate_der());
    assert_eq!(signed.root_certificate_der(), original.root_certificate_der());
}

#[test]
fn test_unapproved_request_cannot_be_encoded() {
    let err = client_request("codec.box.local").to_raw().unwrap_err();
    assert!(matches!(err, PkiError::NoCertificate));
}

#[test]
fn test_corrupt_bundles_are_rejected() {
    let raw = root().to_raw().unwrap();

    assert!(matches!(
        RootAuthority::from_raw(&[]),
        Err(PkiError::EmptyRaw)
    ));

    let mut short = raw.clone();
    short.pop();
    assert!(matches!(
        RootAuthority::from_raw(&short),
        Err(PkiError::InvalidRawLength { .. })
    ));

    let mut skewed = raw.clone();
    let cert_len = u16::from_le_bytes([skewed[2], skewed[3]]) - 1;
    skewed[2..4].copy_from_slice(&cert_len.to_le_bytes());
    let err = RootAuthority::from_raw(&skewed).unwrap_err();
    assert!(err.is_codec_error(), "unexpected error: {}", err);
}

#[test]
fn test_root_bundle_is_not_a_request_bundle() {
    let raw = root().to_raw().unwrap();
    let err = CertificateRequest::from_raw(&raw).unwrap_err();
    assert!(err.is_codec_error(), "unexpected error: {}", err);
}
