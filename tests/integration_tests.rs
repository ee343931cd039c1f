//! Integration tests for box-pki
//!
//! These tests drive the public API end to end: minting a root, approving
//! requests, packing bundles and running the enrollment protocol over
//! in-memory streams.

mod integration;

#[path = "integration/issuance_test.rs"]
mod issuance;

#[path = "integration/codec_test.rs"]
mod codec;

#[path = "integration/enrollment_test.rs"]
mod enrollment;
