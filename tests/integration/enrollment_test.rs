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

//! End-to-end enrollment over in-memory and TCP streams

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use box_pki::certs::{CertificateRequest, ExtendedUsage, MemoryStore};
use box_pki::protocol::message::{
    EnrollmentMessage, OP_REGISTER_CLIENT, OP_REGISTER_CLIENT_RESPONSE,
};
use box_pki::protocol::{
    serve, EnrollmentClient, EnrollmentResponse, EnrollmentServer, LineTransport, MessageParser,
    MessageTransport,
};
use box_pki::{BoxController, PkiError};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::integration::{client_request, issuance, COMPANY, SECRET, SERVER_NAME};

fn bootstrapped() -> BoxController {
    let mut controller = BoxController::new(SECRET, COMPANY, SERVER_NAME, Arc::new(MemoryStore::new()))
        .with_issuance(issuance());
    controller.load_configuration().expect("bootstrap failed");
    controller
}

#[tokio::test]
async fn test_regcl_returns_bundle_from_box_root() {
    let controller = bootstrapped();
    let context = Arc::new(controller.enrollment_context().unwrap());
    let (near, far) = tokio::io::duplex(64 * 1024);
    let server = EnrollmentServer::new(context, LineTransport::new(far), CancellationToken::new());
    let handle = tokio::spawn(server.run());

    let request = client_request("laptop.box.local");
    let mut client = LineTransport::new(near);
    let line = EnrollmentMessage::format(
        SECRET,
        "laptop",
        OP_REGISTER_CLIENT,
        STANDARD.encode(request.request_der()).as_bytes(),
    );
    client.write_message(&line).await.unwrap();
    client.flush().await.unwrap();

    let response = client.read_message().await.unwrap().unwrap();
    let response = MessageParser::new(SECRET).parse(&response).unwrap();
    assert_eq!(response.identity, controller.profile().id);
    assert_eq!(response.op, OP_REGISTER_CLIENT_RESPONSE);

    let payload = response
        .body
        .strip_prefix(b"+OK ")
        .expect("expected +OK response");
    let issued = CertificateRequest::from_raw(&STANDARD.decode(payload).unwrap()).unwrap();
    let signed = issued.signed_certificate().expect("bundle carries a certificate");
    let root = controller.authority().unwrap();
    assert_eq!(signed.root_certificate_der(), root.certificate_der());
    root.trust_pool()
        .verify(signed.certificate(), &[ExtendedUsage::ServerAuth])
        .unwrap();

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_client_register_over_duplex() {
    let controller = bootstrapped();
    let context = Arc::new(controller.enrollment_context().unwrap());
    let (near, far) = tokio::io::duplex(64 * 1024);
    let server = EnrollmentServer::new(context, LineTransport::new(far), CancellationToken::new());
    let handle = tokio::spawn(server.run());

    let mut client = EnrollmentClient::new(LineTransport::new(near), SECRET, "laptop");
    let response = client
        .register(client_request("laptop.box.local"))
        .await
        .unwrap();

    match response {
        EnrollmentResponse::Issued(request) => {
            assert!(request.private_key_pem().is_ok());
            let signed = request.signed_certificate().unwrap();
            assert_eq!(
                signed.root_certificate_der(),
                controller.authority().unwrap().certificate_der()
            );
        }
        EnrollmentResponse::Rejected(reason) => panic!("registration rejected: {}", reason),
    }

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bad_body_gets_err_response() {
    let controller = bootstrapped();
    let context = Arc::new(controller.enrollment_context().unwrap());
    let (near, far) = tokio::io::duplex(64 * 1024);
    let server = EnrollmentServer::new(context, LineTransport::new(far), CancellationToken::new());
    let handle = tokio::spawn(server.run());

    let mut client = LineTransport::new(near);
    client
        .write_message(b"wreckage#laptop REGCL !!not-base64!!")
        .await
        .unwrap();
    client.flush().await.unwrap();

    let response = client.read_message().await.unwrap().unwrap();
    let expected = format!("wreckage#{} REGCLRES +ERR ", controller.profile().id);
    assert!(response.starts_with(expected.as_bytes()));

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wrong_secret_ends_connection() {
    let controller = bootstrapped();
    let context = Arc::new(controller.enrollment_context().unwrap());
    let (near, far) = tokio::io::duplex(64 * 1024);
    let server = EnrollmentServer::new(context, LineTransport::new(far), CancellationToken::new());
    let handle = tokio::spawn(server.run());

    let mut client = LineTransport::new(near);
    client
        .write_message(b"wreckoge#laptop REGCL AAAA")
        .await
        .unwrap();
    client.flush().await.unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, PkiError::InvalidSecret));
    assert!(client.read_message().await.unwrap().is_none());
}

#[tokio::test]
async fn test_tcp_serve_and_shutdown() {
    let controller = bootstrapped();
    let context = Arc::new(controller.enrollment_context().unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(serve(listener, context, 64 * 1024, shutdown.clone()));

    let stream = TcpStream::connect(address).await.unwrap();
    let mut client = EnrollmentClient::new(LineTransport::new(stream), SECRET, "laptop");
    let response = client
        .register(client_request("laptop.box.local"))
        .await
        .unwrap();
    assert!(response.is_issued());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}
