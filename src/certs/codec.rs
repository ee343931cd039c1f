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

//! Raw binary bundles.
//!
//! Two length-prefixed layouts carry certificate material between a box and
//! its clients and into storage. All length fields are two byte little-endian
//! integers, and the leading total counts every byte after itself.
//!
//! ```text
//! root authority:  [total][cert_len][key_len][PEM cert][PEM key]
//! request bundle:  [total][csr_len][cert_len][root_len][CSR DER][PEM cert][PEM root]
//! ```
//!
//! Decoding walks the input with a bounds-checked cursor and rejects any
//! disagreement between declared and actual lengths.

use bytes::{Buf, BufMut, BytesMut};
use pem::Pem;

use super::authority::RootAuthority;
use super::keys::RsaKeyPair;
use super::request::{CertificateRequest, SignedCertificate};
use super::{PEM_CERTIFICATE, PEM_ROOT_CERTIFICATE, PEM_RSA_PRIVATE_KEY};
use crate::error::{PkiError, Result};

/// Size of one length field.
const LEN_FIELD: usize = 2;

/// Encode a root authority bundle.
pub fn encode_root(authority: &RootAuthority) -> Result<Vec<u8>> {
    let cert = authority.certificate_pem();
    let key = authority.private_key_pem()?;
    encode_parts(&[("certificate", cert.as_bytes()), ("key", key.as_bytes())])
}

/// Decode a root authority bundle.
pub fn decode_root(raw: &[u8]) -> Result<RootAuthority> {
    let [cert, key] = decode_parts(raw, ["certificate", "key"])?;
    let cert_der = decode_pem(cert, PEM_CERTIFICATE)?;
    let key_der = decode_pem(key, PEM_RSA_PRIVATE_KEY)?;
    RootAuthority::from_parts(cert_der, RsaKeyPair::from_pkcs1_der(&key_der)?)
}

/// Encode an approved request bundle.
pub fn encode_request(request: &CertificateRequest) -> Result<Vec<u8>> {
    let signed = request.signed_certificate().ok_or(PkiError::NoCertificate)?;
    let cert = signed.certificate_pem();
    let root = signed.root_certificate_pem();
    encode_parts(&[
        ("request", request.request_der()),
        ("certificate", cert.as_bytes()),
        ("root certificate", root.as_bytes()),
    ])
}

/// Decode an approved request bundle.
///
/// The decoded request holds no private key.
pub fn decode_request(raw: &[u8]) -> Result<CertificateRequest> {
    let [csr, cert, root] = decode_parts(raw, ["request", "certificate", "root certificate"])?;
    let cert_der = decode_pem(cert, PEM_CERTIFICATE)?;
    let root_der = decode_pem(root, PEM_ROOT_CERTIFICATE)?;

    let mut request = CertificateRequest::from_der(csr.to_vec())?;
    request.attach(SignedCertificate::from_der(&cert_der, &root_der)?)?;
    Ok(request)
}

impl RootAuthority {
    /// Encode as a raw root authority bundle.
    pub fn to_raw(&self) -> Result<Vec<u8>> {
        encode_root(self)
    }

    /// Decode from a raw root authority bundle.
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        decode_root(raw)
    }
}

impl CertificateRequest {
    /// Encode as a raw request bundle. The request must be approved.
    pub fn to_raw(&self) -> Result<Vec<u8>> {
        encode_request(self)
    }

    /// Decode from a raw request bundle.
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        decode_request(raw)
    }
}

/// Wrap DER bytes in a PEM block.
pub fn encode_pem(tag: &str, der: &[u8]) -> String {
    pem::encode(&Pem::new(tag, der))
}

/// Unwrap a PEM block, requiring `expected` as its tag.
pub fn decode_pem(data: &[u8], expected: &'static str) -> Result<Vec<u8>> {
    let block = pem::parse(data).map_err(|e| PkiError::invalid_pem(e.to_string()))?;
    if block.tag() != expected {
        return Err(PkiError::unexpected_pem_tag(expected, block.tag()));
    }
    Ok(block.into_contents())
}

fn encode_parts(parts: &[(&'static str, &[u8])]) -> Result<Vec<u8>> {
    let mut total = parts.len() * LEN_FIELD;
    for (part, data) in parts {
        if data.len() > usize::from(u16::MAX) {
            return Err(PkiError::PartTooLarge {
                part,
                len: data.len(),
            });
        }
        total += data.len();
    }
    let total_field = u16::try_from(total).map_err(|_| PkiError::PartTooLarge {
        part: "bundle",
        len: total,
    })?;

    let mut buf = BytesMut::with_capacity(LEN_FIELD + total);
    buf.put_u16_le(total_field);
    for (_, data) in parts {
        // Checked above.
        buf.put_u16_le(data.len() as u16);
    }
    for (_, data) in parts {
        buf.put_slice(data);
    }
    Ok(buf.to_vec())
}

fn decode_parts<'a, const N: usize>(
    raw: &'a [u8],
    names: [&'static str; N],
) -> Result<[&'a [u8]; N]> {
    if raw.is_empty() {
        return Err(PkiError::EmptyRaw);
    }

    let mut cursor = RawCursor::new(raw);
    let total = cursor.read_len()?;
    if total != cursor.remaining() {
        return Err(PkiError::InvalidRawLength {
            declared: total,
            actual: cursor.remaining(),
        });
    }

    let mut lens = [0usize; N];
    for len in lens.iter_mut() {
        *len = cursor.read_len()?;
    }
    let parts = N * LEN_FIELD + lens.iter().sum::<usize>();
    if parts != total {
        return Err(PkiError::InvalidPartLengths { parts, total });
    }

    let mut out: [&'a [u8]; N] = [&[]; N];
    for ((slot, len), name) in out.iter_mut().zip(lens).zip(names) {
        *slot = cursor.take(name, len)?;
    }
    Ok(out)
}

/// Forward-only reader over a raw bundle.
struct RawCursor<'a> {
    buf: &'a [u8],
}

impl<'a> RawCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn read_len(&mut self) -> Result<usize> {
        if self.buf.remaining() < LEN_FIELD {
            return Err(PkiError::TruncatedRaw {
                needed: LEN_FIELD,
                available: self.buf.remaining(),
            });
        }
        Ok(usize::from(self.buf.get_u16_le()))
    }

    fn take(&mut self, part: &'static str, len: usize) -> Result<&'a [u8]> {
        if self.buf.len() < len {
            return Err(PkiError::InvalidSliceLength {
                part,
                declared: len,
                actual: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn with_total(body: &[u8]) -> Vec<u8> {
        let mut raw = (body.len() as u16).to_le_bytes().to_vec();
        raw.extend_from_slice(body);
        raw
    }

    #[test]
    fn test_layout() {
        let raw = encode_parts(&[("a", b"xyz"), ("b", b"hello")]).unwrap();
        assert_eq!(
            raw,
            [&[12u8, 0, 3, 0, 5, 0][..], &b"xyz"[..], &b"hello"[..]].concat()
        );
        let [a, b] = decode_parts(&raw, ["a", "b"]).unwrap();
        assert_eq!(a, b"xyz");
        assert_eq!(b, b"hello");
    }

    #[test]
    fn test_empty_raw() {
        assert!(matches!(
            decode_parts(&[], ["a", "b"]),
            Err(PkiError::EmptyRaw)
        ));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            decode_parts(&[7], ["a", "b"]),
            Err(PkiError::TruncatedRaw { needed: 2, available: 1 })
        ));
        // Total agrees with the remaining bytes but the part headers do not fit.
        assert!(matches!(
            decode_parts(&with_total(&[1, 0]), ["a", "b"]),
            Err(PkiError::TruncatedRaw { .. })
        ));
    }

    #[test]
    fn test_total_length_mismatch() {
        let mut raw = encode_parts(&[("a", b"xyz"), ("b", b"hello")]).unwrap();
        raw.push(0);
        assert!(matches!(
            decode_parts(&raw, ["a", "b"]),
            Err(PkiError::InvalidRawLength { declared: 12, actual: 13 })
        ));
    }

    #[test]
    fn test_part_length_mismatch() {
        let raw = with_total(&[3, 0, 6, 0, b'x', b'y', b'z', b'h', b'e', b'l', b'l', b'o']);
        assert!(matches!(
            decode_parts(&raw, ["a", "b"]),
            Err(PkiError::InvalidPartLengths { parts: 13, total: 12 })
        ));
    }

    #[test]
    fn test_cursor_rejects_short_slice() {
        let mut cursor = RawCursor::new(b"abc");
        assert_eq!(cursor.take("a", 2).unwrap(), b"ab");
        assert!(matches!(
            cursor.take("b", 2),
            Err(PkiError::InvalidSliceLength { part: "b", declared: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_oversized_part_rejected() {
        let big = vec![0u8; usize::from(u16::MAX) + 1];
        assert!(matches!(
            encode_parts(&[("a", &big)]),
            Err(PkiError::PartTooLarge { part: "a", .. })
        ));

        let half = vec![0u8; 40_000];
        assert!(matches!(
            encode_parts(&[("a", &half), ("b", &half)]),
            Err(PkiError::PartTooLarge { part: "bundle", .. })
        ));
    }

    #[test]
    fn test_pem_tag_checked() {
        let block = encode_pem(PEM_RSA_PRIVATE_KEY, b"\x30\x00");
        assert_eq!(decode_pem(block.as_bytes(), PEM_RSA_PRIVATE_KEY).unwrap(), b"\x30\x00");
        assert!(matches!(
            decode_pem(block.as_bytes(), PEM_CERTIFICATE),
            Err(PkiError::UnexpectedPemTag { expected: "CERTIFICATE", .. })
        ));
        assert!(matches!(
            decode_pem(b"not pem", PEM_CERTIFICATE),
            Err(PkiError::InvalidPem(_))
        ));
    }

    #[test]
    fn test_root_bundle_roundtrip() {
        let authority = test_support::authority();
        let raw = authority.to_raw().unwrap();
        assert_eq!(
            usize::from(u16::from_le_bytes([raw[0], raw[1]])),
            raw.len() - 2
        );

        let decoded = RootAuthority::from_raw(&raw).unwrap();
        assert_eq!(decoded.certificate_der(), authority.certificate_der());
        assert_eq!(
            decoded.key_pair().to_pkcs1_der().unwrap(),
            authority.key_pair().to_pkcs1_der().unwrap()
        );
    }

    #[test]
    fn test_root_bundle_with_swapped_tags() {
        let authority = test_support::authority();
        let cert = encode_pem(PEM_ROOT_CERTIFICATE, authority.certificate_der());
        let key = authority.private_key_pem().unwrap();
        let raw = encode_parts(&[("certificate", cert.as_bytes()), ("key", key.as_bytes())])
            .unwrap();
        assert!(matches!(
            decode_root(&raw),
            Err(PkiError::UnexpectedPemTag { expected: "CERTIFICATE", .. })
        ));
    }

    #[test]
    fn test_unapproved_request_not_encodable() {
        let request = test_support::request("leaf.box.local");
        assert!(matches!(request.to_raw(), Err(PkiError::NoCertificate)));
    }

    #[test]
    fn test_request_bundle_roundtrip() {
        let request = test_support::approved_request();
        let raw = request.to_raw().unwrap();

        let decoded = CertificateRequest::from_raw(&raw).unwrap();
        assert_eq!(decoded.request_der(), request.request_der());
        assert!(decoded.key_pair().is_none());

        let original = request.signed_certificate().unwrap();
        let signed = decoded.signed_certificate().unwrap();
        assert_eq!(signed.certificate_der(), original.certificate_der());
        assert_eq!(signed.root_certificate_der(), original.root_certificate_der());
        assert!(signed.is_issued_by_root());
    }

    #[test]
    fn test_request_bundle_rejects_plain_root_tag() {
        let request = test_support::approved_request();
        let signed = request.signed_certificate().unwrap();
        let cert = signed.certificate_pem();
        let root = encode_pem(PEM_CERTIFICATE, signed.root_certificate_der());
        let raw = encode_parts(&[
            ("request", request.request_der()),
            ("certificate", cert.as_bytes()),
            ("root certificate", root.as_bytes()),
        ])
        .unwrap();
        assert!(matches!(
            decode_request(&raw),
            Err(PkiError::UnexpectedPemTag { expected: "ROOT_CERTIFICATE", .. })
        ));
    }
}
