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

//! Integration tests for root minting and request approval

use box_pki::certs::store::names;
use box_pki::certs::verify::{dns_names, is_ca_certificate};
use box_pki::certs::{
    CertificateRequest, DirectoryStore, ExtendedUsage, KeyUsagePolicy, PersistenceStore,
    RootAuthority, SignedCertificate, SigningEngine,
};
use box_pki::PkiError;

use crate::integration::{client_request, root};

#[test]
fn test_root_is_self_verifying_ca() {
    let root = root();

    assert!(root.is_self_signed());
    assert!(is_ca_certificate(root.certificate()));
    root.trust_pool()
        .verify(
            root.certificate(),
            &[ExtendedUsage::ServerAuth, ExtendedUsage::ClientAuth],
        )
        .expect("root should verify against itself");
}

#[test]
fn test_every_policy_verifies_with_matching_usage_only() {
    let root = root();
    let engine = SigningEngine::default();
    let pool = root.trust_pool();

    let cases = [
        (
            KeyUsagePolicy::ServerAndClient,
            vec![ExtendedUsage::ServerAuth, ExtendedUsage::ClientAuth],
            ExtendedUsage::CodeSigning,
        ),
        (
            KeyUsagePolicy::ServerOnly,
            vec![ExtendedUsage::ServerAuth],
            ExtendedUsage::ClientAuth,
        ),
        (
            KeyUsagePolicy::ClientOnly,
            vec![ExtendedUsage::ClientAuth],
            ExtendedUsage::ServerAuth,
        ),
    ];

    for (policy, matching, disjoint) in cases {
        let mut request = client_request("device.box.local");
        engine
            .approve(&root, &mut request, policy)
            .unwrap_or_else(|e| panic!("{:?} approval failed: {}", policy, e));

        let certificate = request.signed_certificate().unwrap().certificate();
        pool.verify(certificate, &matching)
            .unwrap_or_else(|e| panic!("{:?} should verify: {}", policy, e));
        assert!(
            pool.verify(certificate, &[disjoint]).is_err(),
            "{:?} should not verify for {}",
            policy,
            disjoint
        );
    }
}

#[test]
fn test_issued_certificate_carries_requested_names() {
    let root = root();
    let mut request = client_request("device.box.local");
    SigningEngine::default()
        .approve_client(&root, &mut request)
        .unwrap();

    let signed = request.signed_certificate().unwrap();
    assert!(signed.is_issued_by_root());
    assert_eq!(
        dns_names(signed.certificate()).unwrap(),
        vec!["device.box.local".to_string()]
    );
    assert_eq!(signed.root_certificate_der(), root.certificate_der());
}

#[test]
fn test_altered_signature_algorithm_is_rejected() {
    let root = root();
    let request = client_request("device.box.local");
    let signed = SigningEngine::default()
        .issue(&root, &request, KeyUsagePolicy::ServerOnly)
        .unwrap();

    let mut certificate = signed.certificate().clone();
    certificate.signature_algorithm.oid = const_oid::db::rfc5912::SHA_1_WITH_RSA_ENCRYPTION;
    let altered = SignedCertificate::new(certificate, root.shared_certificate()).unwrap();

    let mut request = request;
    let err = request
        .validate_and_accept(altered, KeyUsagePolicy::ServerOnly)
        .unwrap_err();
    assert!(matches!(err, PkiError::WrongSignatureAlgorithm(_)));
    assert!(!request.is_approved());
}

#[test]
fn test_name_outside_permitted_subtree_is_refused() {
    let root = root();
    let mut request = client_request("device.example.com");

    let err = SigningEngine::default()
        .approve_server(&root, &mut request)
        .unwrap_err();
    assert!(matches!(err, PkiError::NotPermittedDnsName(_)));
    assert!(!request.is_approved());
}

#[test]
fn test_persist_and_reload_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = root();
    let ca_store = DirectoryStore::new(dir.path()).within("ca").unwrap();
    root.persist(&ca_store).unwrap();

    let mut request = client_request("device.box.local");
    SigningEngine::default()
        .approve_server(&root, &mut request)
        .unwrap();
    let request_store = DirectoryStore::new(dir.path()).within("ca_server").unwrap();
    request.persist(&request_store).unwrap();

    let loaded_root = RootAuthority::load(&ca_store).unwrap();
    assert_eq!(loaded_root.certificate_der(), root.certificate_der());

    let loaded = CertificateRequest::load(&request_store).unwrap();
    assert!(loaded.key_pair().is_some());
    assert_eq!(
        loaded.signed_certificate().unwrap().certificate_der(),
        request.signed_certificate().unwrap().certificate_der()
    );

    let pem = request_store.retrieve(names::REQUEST_ROOT_CERTIFICATE).unwrap();
    assert!(String::from_utf8(pem)
        .unwrap()
        .starts_with("-----BEGIN ROOT_CERTIFICATE-----"));
    assert!(dir.path().join("ca").join(names::ROOT_KEY).exists());
}
