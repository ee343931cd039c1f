//! Error types for the box PKI.
//!
//! Every fallible operation in the crate returns [`PkiError`]. The variants are
//! grouped by the layer that raises them: key and certificate handling, the
//! raw bundle codec, the persistence store, the enrollment message grammar and
//! configuration.

use thiserror::Error;

/// Result type alias using [`PkiError`].
pub type Result<T> = std::result::Result<T, PkiError>;

/// Errors that can occur while issuing, encoding or serving certificates.
#[derive(Debug, Error)]
pub enum PkiError {
    /// RSA key generation or key encoding failed.
    #[error("Key error: {0}")]
    Key(String),

    /// Building or signing a certificate failed.
    #[error("Certificate build error: {0}")]
    CertificateBuild(String),

    /// Failed to parse an X.509 certificate.
    #[error("Certificate parsing error: {0}")]
    CertificateParsing(String),

    /// Failed to generate or parse a CSR.
    #[error("CSR error: {0}")]
    Csr(String),

    /// The CSR's self-signature does not verify under its own public key.
    #[error("CSR signature verification failed: {0}")]
    RequestSignature(String),

    /// A certificate or CSR uses a signature algorithm other than the one required.
    #[error("incorrect signature algorithm received: {0}")]
    WrongSignatureAlgorithm(String),

    /// Chain verification against the trust pool failed.
    #[error("Certificate verification failed: {0}")]
    Verification(String),

    /// A DNS name is excluded by the issuing authority's name constraints.
    #[error("excluded DNS name: {0}")]
    ExcludedDnsName(String),

    /// A DNS name falls outside the issuing authority's permitted subtrees.
    #[error("DNS name not permitted: {0}")]
    NotPermittedDnsName(String),

    /// The request already carries a signed certificate.
    #[error("certificate request has already been approved")]
    AlreadyApproved,

    /// The value has no certificate.
    #[error("has no certificate")]
    NoCertificate,

    /// The value has no root CA certificate.
    #[error("has no root CA certificate")]
    NoRootCertificate,

    /// The value has no certificate request.
    #[error("has no certificate request")]
    NoCertificateRequest,

    /// The value has no private key.
    #[error("has no private key")]
    NoPrivateKey,

    /// A private key does not belong to the certificate it was loaded with.
    #[error("private key does not match certificate public key")]
    KeyMismatch,

    /// The raw bundle is empty.
    #[error("raw bundle is empty")]
    EmptyRaw,

    /// The raw bundle ended before a length header or part could be read.
    #[error("raw bundle truncated: needed {needed} bytes, {available} available")]
    TruncatedRaw {
        /// Bytes required by the next read.
        needed: usize,
        /// Bytes left in the bundle.
        available: usize,
    },

    /// The declared total length does not match the bytes that follow it.
    #[error("raw bundle length is invalid: declared {declared}, actual {actual}")]
    InvalidRawLength {
        /// Length declared by the total-length header.
        declared: usize,
        /// Bytes actually present after the header.
        actual: usize,
    },

    /// The declared part lengths plus their headers do not add up to the total.
    #[error("raw bundle part lengths are invalid: parts cover {parts} bytes, total is {total}")]
    InvalidPartLengths {
        /// Sum of part lengths and part headers.
        parts: usize,
        /// Declared total length.
        total: usize,
    },

    /// A sliced part does not have its declared length.
    #[error("raw {part} slice length is invalid: declared {declared}, got {actual}")]
    InvalidSliceLength {
        /// Name of the part being cut.
        part: &'static str,
        /// Length declared in the header.
        declared: usize,
        /// Length actually cut.
        actual: usize,
    },

    /// A part is too large for a two byte length field.
    #[error("raw {part} is {len} bytes, which exceeds the 65535 byte limit")]
    PartTooLarge {
        /// Name of the part being encoded.
        part: &'static str,
        /// Length of the part.
        len: usize,
    },

    /// Invalid PEM data.
    #[error("Invalid PEM data: {0}")]
    InvalidPem(String),

    /// A PEM block carries a different type tag than the field requires.
    #[error("PEM block has invalid type tag: expected '{expected}', got '{actual}'")]
    UnexpectedPemTag {
        /// Tag required for the field.
        expected: &'static str,
        /// Tag found in the block.
        actual: String,
    },

    /// The store has nothing under the given name.
    #[error("no stored item named '{0}'")]
    NotFound(String),

    /// The message has no identity after the secret header.
    #[error("message must have identity info")]
    NoIdentity,

    /// The message has no operation name.
    #[error("message must have op name after secret identity hash")]
    NoOpName,

    /// The secret is followed by a space instead of `#`.
    #[error("message must have secret with hash suffix")]
    NoSecretHeader,

    /// The message secret differs from the configured secret.
    #[error("message secret does not match expect secret")]
    InvalidSecret,

    /// The operation name exceeds the maximum length.
    #[error("message must have op name with max length of {max} in characters")]
    InvalidOpName {
        /// Maximum accepted length.
        max: usize,
    },

    /// The message ended before the grammar was satisfied.
    #[error("messages must be in format: secret#identity OP [body...]")]
    InvalidMessage,

    /// No secret was provided.
    #[error("Required to provide secret")]
    SecretRequired,

    /// The peer answered with something other than the expected response.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Base64 decoding error.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// DER encoding/decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PkiError {
    /// Create a key error with the given message.
    pub fn key(msg: impl Into<String>) -> Self {
        Self::Key(msg.into())
    }

    /// Create a certificate build error with the given message.
    pub fn certificate_build(msg: impl Into<String>) -> Self {
        Self::CertificateBuild(msg.into())
    }

    /// Create a certificate parsing error with the given message.
    pub fn certificate_parsing(msg: impl Into<String>) -> Self {
        Self::CertificateParsing(msg.into())
    }

    /// Create a CSR error with the given message.
    pub fn csr(msg: impl Into<String>) -> Self {
        Self::Csr(msg.into())
    }

    /// Create a verification error with the given message.
    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification(msg.into())
    }

    /// Create an invalid PEM error.
    pub fn invalid_pem(msg: impl Into<String>) -> Self {
        Self::InvalidPem(msg.into())
    }

    /// Create an unexpected PEM tag error.
    pub fn unexpected_pem_tag(expected: &'static str, actual: impl Into<String>) -> Self {
        Self::UnexpectedPemTag {
            expected,
            actual: actual.into(),
        }
    }

    /// Create a not found error for a store name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if this error came from the enrollment message grammar.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::NoIdentity
                | Self::NoOpName
                | Self::NoSecretHeader
                | Self::InvalidSecret
                | Self::InvalidOpName { .. }
                | Self::InvalidMessage
                | Self::SecretRequired
        )
    }

    /// Returns true if this error came from decoding or encoding a raw bundle.
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyRaw
                | Self::TruncatedRaw { .. }
                | Self::InvalidRawLength { .. }
                | Self::InvalidPartLengths { .. }
                | Self::InvalidSliceLength { .. }
                | Self::PartTooLarge { .. }
                | Self::InvalidPem(_)
                | Self::UnexpectedPemTag { .. }
        )
    }

    /// Returns true if the store simply had nothing under the requested name.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PkiError::InvalidRawLength {
            declared: 10,
            actual: 8,
        };
        assert_eq!(
            err.to_string(),
            "raw bundle length is invalid: declared 10, actual 8"
        );

        let err = PkiError::unexpected_pem_tag("CERTIFICATE", "RSA PRIVATE KEY");
        assert_eq!(
            err.to_string(),
            "PEM block has invalid type tag: expected 'CERTIFICATE', got 'RSA PRIVATE KEY'"
        );

        assert_eq!(
            PkiError::InvalidSecret.to_string(),
            "message secret does not match expect secret"
        );
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(PkiError::NoOpName.is_protocol_error());
        assert!(PkiError::InvalidOpName { max: 20 }.is_protocol_error());
        assert!(!PkiError::EmptyRaw.is_protocol_error());
    }

    #[test]
    fn test_is_codec_error() {
        assert!(PkiError::EmptyRaw.is_codec_error());
        assert!(PkiError::invalid_pem("bad").is_codec_error());
        assert!(!PkiError::NoCertificate.is_codec_error());
    }

    #[test]
    fn test_is_not_found() {
        assert!(PkiError::not_found("ca.cert").is_not_found());
        assert!(!PkiError::config("bad").is_not_found());
    }
}
