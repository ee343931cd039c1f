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

//! Enrollment server.
//!
//! One [`EnrollmentServer`] drives one connection. It reads a line, parses
//! it against the box secret and dispatches on the operation name. Only
//! `REGCL` is served: the body is a base64 CSR which is approved for server
//! authentication and answered with
//!
//! ```text
//! SECRET#BOX_ID REGCLRES +OK <base64 request bundle>
//! SECRET#BOX_ID REGCLRES +ERR <reason>
//! ```
//!
//! A line that fails to parse ends the connection. Any read error other than
//! "no data yet" does the same.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::message::{EnrollmentMessage, MessageParser, OP_REGISTER_CLIENT, OP_REGISTER_CLIENT_RESPONSE};
use super::transport::{LineTransport, MessageTransport};
use crate::certs::{CertificateRequest, RootAuthority, SigningEngine};
use crate::error::{PkiError, Result};

/// Pause after a failed accept so a persistent error such as descriptor
/// exhaustion does not spin the loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Everything a connection needs to answer enrollment requests.
pub struct EnrollmentContext {
    secret: String,
    identity: String,
    authority: Arc<RootAuthority>,
    engine: SigningEngine,
}

impl fmt::Debug for EnrollmentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrollmentContext")
            .field("identity", &self.identity)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl EnrollmentContext {
    /// Create a context answering as `identity` with certificates from `authority`.
    pub fn new(
        secret: impl Into<String>,
        identity: impl Into<String>,
        authority: Arc<RootAuthority>,
        engine: SigningEngine,
    ) -> Self {
        Self {
            secret: secret.into(),
            identity: identity.into(),
            authority,
            engine,
        }
    }

    /// Shared secret expected on every line.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Identity the server answers with.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Issuing authority.
    pub fn authority(&self) -> &RootAuthority {
        &self.authority
    }

    /// Engine used to approve requests.
    pub fn engine(&self) -> &SigningEngine {
        &self.engine
    }

    /// Approve a base64 encoded CSR and return the raw request bundle.
    pub fn register_client(&self, body: &[u8]) -> Result<Vec<u8>> {
        let der = STANDARD.decode(body)?;
        let mut request = CertificateRequest::from_der(der)?;
        self.engine.approve_server(&self.authority, &mut request)?;
        request.to_raw()
    }

    fn respond(&self, op: &str, body: &[u8]) -> Vec<u8> {
        EnrollmentMessage::format(&self.secret, &self.identity, op, body)
    }
}

enum State {
    Reading,
    Parsed(EnrollmentMessage),
    Closed,
}

/// Serves enrollment requests on one connection.
pub struct EnrollmentServer<T> {
    context: Arc<EnrollmentContext>,
    transport: T,
    parser: MessageParser,
    shutdown: CancellationToken,
}

impl<T: MessageTransport> EnrollmentServer<T> {
    /// Serve `transport` until it closes or `shutdown` fires.
    pub fn new(context: Arc<EnrollmentContext>, transport: T, shutdown: CancellationToken) -> Self {
        let parser = MessageParser::new(context.secret());
        Self {
            context,
            transport,
            parser,
            shutdown,
        }
    }

    /// Run the read loop.
    ///
    /// Returns `Ok(())` when the peer closes the connection or shutdown is
    /// requested. Parse errors and transport errors end the loop and are
    /// returned.
    pub async fn run(mut self) -> Result<()> {
        let mut state = State::Reading;
        loop {
            state = match state {
                State::Reading => self.read().await?,
                State::Parsed(message) => {
                    self.dispatch(message).await?;
                    State::Reading
                }
                State::Closed => return Ok(()),
            };
        }
    }

    /// Unwrap the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    async fn read(&mut self) -> Result<State> {
        let shutdown = self.shutdown.clone();
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(box_id = %self.context.identity(), "Enrollment connection cancelled");
                return Ok(State::Closed);
            }
            read = self.transport.read_message() => read,
        };

        let raw = match read {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(box_id = %self.context.identity(), "Enrollment peer closed connection");
                return Ok(State::Closed);
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                return Ok(State::Reading);
            }
            Err(e) => {
                error!(box_id = %self.context.identity(), error = %e, "Failed to read enrollment message");
                return Err(e.into());
            }
        };

        match self.parser.parse(&raw) {
            Ok(message) => Ok(State::Parsed(message)),
            Err(e) => {
                warn!(box_id = %self.context.identity(), error = %e, "Failed to parse enrollment message");
                Err(e)
            }
        }
    }

    async fn dispatch(&mut self, message: EnrollmentMessage) -> Result<()> {
        match message.op.as_str() {
            OP_REGISTER_CLIENT => self.register_client(message).await,
            op => {
                debug!(identity = %message.identity, op, "Ignoring unsupported operation");
                Ok(())
            }
        }
    }

    async fn register_client(&mut self, message: EnrollmentMessage) -> Result<()> {
        let EnrollmentMessage { identity, body, .. } = message;
        info!(%identity, op = OP_REGISTER_CLIENT, "Client registration requested");

        // Key checks and signing are CPU bound.
        let context = Arc::clone(&self.context);
        let outcome = tokio::task::spawn_blocking(move || context.register_client(&body))
            .await
            .map_err(|e| PkiError::Io(io::Error::other(e)))?;

        let reply = match outcome {
            Ok(raw) => {
                info!(%identity, "Client registration approved");
                format!("+OK {}", STANDARD.encode(raw))
            }
            Err(e) => {
                warn!(%identity, error = %e, "Client registration rejected");
                format!("+ERR {}", e)
            }
        };

        let response = self
            .context
            .respond(OP_REGISTER_CLIENT_RESPONSE, reply.as_bytes());
        self.transport.write_message(&response).await?;
        self.transport.flush().await?;
        Ok(())
    }
}

/// Accept connections on `listener` and serve each on its own task.
///
/// Stops accepting once `shutdown` fires, then waits for open connections,
/// which are cancelled through child tokens.
pub async fn serve(
    listener: TcpListener,
    context: Arc<EnrollmentContext>,
    max_message_bytes: usize,
    shutdown: CancellationToken,
) -> Result<()> {
    let address = listener.local_addr()?;
    info!(%address, box_id = %context.identity(), "Enrollment server listening");

    let tracker = TaskTracker::new();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Failed to accept enrollment connection");
                if accept_backoff(&shutdown).await {
                    continue;
                }
                break;
            }
        };

        debug!(%peer, "Accepted enrollment connection");
        let transport = LineTransport::new(stream).max_message_bytes(max_message_bytes);
        let server = EnrollmentServer::new(Arc::clone(&context), transport, shutdown.child_token());
        tracker.spawn(async move {
            if let Err(e) = server.run().await {
                warn!(%peer, error = %e, "Enrollment connection ended with error");
            }
        });
    }

    tracker.close();
    tracker.wait().await;
    info!(%address, "Enrollment server stopped");
    Ok(())
}

/// Wait out [`ACCEPT_RETRY_DELAY`]. Returns false if shutdown fired first.
async fn accept_backoff(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::transport::MIN_MESSAGE_BYTES;
    use crate::test_support;
    use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream};

    const SECRET: &str = "wreckage";
    const BOX_ID: &str = "box-1";
    const DEFAULT_LIMIT: usize = 64 * 1024;

    fn context() -> Arc<EnrollmentContext> {
        Arc::new(EnrollmentContext::new(
            SECRET,
            BOX_ID,
            test_support::shared_authority(),
            test_support::engine(),
        ))
    }

    fn spawn_server(shutdown: CancellationToken) -> (
        LineTransport<DuplexStream>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        spawn_limited_server(shutdown, DEFAULT_LIMIT)
    }

    fn spawn_limited_server(
        shutdown: CancellationToken,
        max_message_bytes: usize,
    ) -> (LineTransport<DuplexStream>, tokio::task::JoinHandle<Result<()>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let transport = LineTransport::new(server).max_message_bytes(max_message_bytes);
        let server = EnrollmentServer::new(context(), transport, shutdown);
        (LineTransport::new(client), tokio::spawn(server.run()))
    }

    async fn send<S>(client: &mut LineTransport<S>, line: &[u8])
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        client.write_message(line).await.unwrap();
        client.flush().await.unwrap();
    }

    #[test]
    fn test_register_client_returns_bundle() {
        let request = test_support::request("client.box.local");
        let body = STANDARD.encode(request.request_der());

        let raw = context().register_client(body.as_bytes()).unwrap();
        let issued = CertificateRequest::from_raw(&raw).unwrap();

        assert_eq!(issued.request_der(), request.request_der());
        assert!(issued.signed_certificate().unwrap().is_issued_by_root());
    }

    #[test]
    fn test_register_client_rejects_bad_base64() {
        let err = context().register_client(b"not base64!").unwrap_err();
        assert!(matches!(err, PkiError::Base64(_)));
    }

    #[tokio::test]
    async fn test_regcl_ok_response() {
        let (mut client, handle) = spawn_server(CancellationToken::new());
        let request = test_support::request("client.box.local");
        let body = STANDARD.encode(request.request_der());

        send(
            &mut client,
            &EnrollmentMessage::format(SECRET, "client-7", OP_REGISTER_CLIENT, body.as_bytes()),
        )
        .await;

        let line = client.read_message().await.unwrap().unwrap();
        let response = MessageParser::new(SECRET).parse(&line).unwrap();
        assert_eq!(response.identity, BOX_ID);
        assert_eq!(response.op, OP_REGISTER_CLIENT_RESPONSE);

        let payload = response.body.strip_prefix(b"+OK ").unwrap();
        let issued = CertificateRequest::from_raw(&STANDARD.decode(payload).unwrap()).unwrap();
        let signed = issued.signed_certificate().unwrap();
        assert_eq!(
            signed.root_certificate_der(),
            test_support::authority().certificate_der()
        );

        drop(client);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_regcl_at_smallest_message_limit() {
        let (mut client, handle) = spawn_limited_server(CancellationToken::new(), MIN_MESSAGE_BYTES);
        let request = test_support::request("client.box.local");
        let body = STANDARD.encode(request.request_der());

        send(
            &mut client,
            &EnrollmentMessage::format(SECRET, "client-7", OP_REGISTER_CLIENT, body.as_bytes()),
        )
        .await;

        let line = client.read_message().await.unwrap().unwrap();
        let response = MessageParser::new(SECRET).parse(&line).unwrap();
        let payload = response.body.strip_prefix(b"+OK ").unwrap();
        CertificateRequest::from_raw(&STANDARD.decode(payload).unwrap()).unwrap();

        drop(client);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_large_response_is_not_capped() {
        // An inbound limit below the response size must not stop the reply.
        let (mut client, handle) = spawn_limited_server(CancellationToken::new(), 2048);
        let request = test_support::request("client.box.local");
        let body = STANDARD.encode(request.request_der());

        send(
            &mut client,
            &EnrollmentMessage::format(SECRET, "client-7", OP_REGISTER_CLIENT, body.as_bytes()),
        )
        .await;

        let line = client.read_message().await.unwrap().unwrap();
        assert!(line.len() > 2048);
        assert!(line.starts_with(b"wreckage#box-1 REGCLRES +OK "));

        drop(client);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_regcl_err_response_keeps_connection() {
        let (mut client, handle) = spawn_server(CancellationToken::new());

        send(&mut client, b"wreckage#client-7 REGCL %%%").await;
        let line = client.read_message().await.unwrap().unwrap();
        let response = MessageParser::new(SECRET).parse(&line).unwrap();
        assert!(response.body.starts_with(b"+ERR "));

        // The loop keeps serving after an error response.
        send(&mut client, b"wreckage#client-7 REGCL AAAA").await;
        let line = client.read_message().await.unwrap().unwrap();
        assert!(line.starts_with(b"wreckage#box-1 REGCLRES +ERR "));

        drop(client);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_parse_failure_ends_loop() {
        let (mut client, handle) = spawn_server(CancellationToken::new());

        send(&mut client, b"wreckoge#client-7 REGCL AAAA").await;

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, PkiError::InvalidSecret));
        assert!(client.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_op_is_ignored() {
        let (mut client, handle) = spawn_server(CancellationToken::new());

        send(&mut client, b"wreckage#client-7 PING").await;
        drop(client);

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_blank_lines_are_retried() {
        let (client, server) = tokio::io::duplex(1024);
        let server = EnrollmentServer::new(context(), LineTransport::new(server), CancellationToken::new());
        let handle = tokio::spawn(server.run());

        let mut client = client;
        client.write_all(b"\n\r\n\n").await.unwrap();
        drop(client);

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_stops_idle_loop() {
        let shutdown = CancellationToken::new();
        let (_client, handle) = spawn_server(shutdown.clone());

        shutdown.cancel();

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, context(), DEFAULT_LIMIT, shutdown.clone()));

        let stream = tokio::net::TcpStream::connect(address).await.unwrap();
        let mut client = LineTransport::new(stream);
        send(&mut client, b"wreckage#client-7 REGCL %%%").await;
        let line = client.read_message().await.unwrap().unwrap();
        assert!(line.starts_with(b"wreckage#box-1 REGCLRES +ERR "));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_backoff_waits() {
        let shutdown = CancellationToken::new();
        let start = tokio::time::Instant::now();
        assert!(accept_backoff(&shutdown).await);
        assert!(start.elapsed() >= ACCEPT_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_accept_backoff_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(!accept_backoff(&shutdown).await);
    }
}
