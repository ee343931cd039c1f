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

//! Message transports.
//!
//! A transport moves whole enrollment lines. [`LineTransport`] frames them
//! with `\n` over any tokio byte stream, accepting an optional `\r` before the
//! terminator. The size limit bounds inbound lines only; responses carry
//! whole certificate bundles and are written as they are.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Default upper bound on a single inbound message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Smallest inbound limit that still admits a `REGCL` line carrying a CSR
/// for the largest RSA keys in common use.
pub const MIN_MESSAGE_BYTES: usize = 8 * 1024;

/// A bidirectional channel of enrollment messages.
#[async_trait]
pub trait MessageTransport: Send {
    /// Read the next message.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection. An error
    /// of kind [`io::ErrorKind::WouldBlock`] means no data is available yet
    /// and the read may simply be retried.
    async fn read_message(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Queue one message for sending.
    async fn write_message(&mut self, message: &[u8]) -> io::Result<()>;

    /// Flush queued messages to the peer.
    async fn flush(&mut self) -> io::Result<()>;
}

/// Newline-delimited messages over a byte stream.
#[derive(Debug)]
pub struct LineTransport<S> {
    stream: BufReader<S>,
    max_message_bytes: usize,
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Set the largest accepted inbound message, excluding the line terminator.
    pub fn max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

#[async_trait]
impl<S> MessageTransport for LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_message(&mut self) -> io::Result<Option<Vec<u8>>> {
        // Leave room for "\r\n" on a maximum size message.
        let limit = self.max_message_bytes as u64 + 2;
        let mut line = Vec::new();
        let read = (&mut self.stream)
            .take(limit)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }

        let terminated = line.last() == Some(&b'\n');
        if terminated {
            line.pop();
        } else if read as u64 >= limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message exceeds {} bytes", self.max_message_bytes),
            ));
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        // Blank keep-alive lines carry nothing to process.
        if line.is_empty() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no data yet"));
        }
        Ok(Some(line))
    }

    async fn write_message(&mut self, message: &[u8]) -> io::Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(message).await?;
        stream.write_all(b"\n").await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.stream.get_mut().flush().await
    }
}
