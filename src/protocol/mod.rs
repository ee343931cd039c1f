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

//! Line based enrollment protocol.
//!
//! Boxes and their clients exchange single lines of the form
//! `SECRET#IDENTITY OP [BODY]`. A client registers by sending its CSR with
//! `REGCL`; the box answers `REGCLRES` with either the approved request
//! bundle or an error.

pub mod client;
pub mod message;
pub mod server;
pub mod transport;

pub use client::{EnrollmentClient, EnrollmentResponse};
pub use message::{EnrollmentMessage, MessageParser};
pub use server::{serve, EnrollmentContext, EnrollmentServer};
pub use transport::{LineTransport, MessageTransport};
