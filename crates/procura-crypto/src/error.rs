//! Cryptographic error types.

use thiserror::Error;

/// Errors from hashing, signing and key handling.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material had the wrong length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// A signature had the wrong length.
    #[error("invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Bytes did not decode to a valid Ed25519 public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signature does not match the message and key.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Hex input could not be decoded.
    #[error("invalid hex encoding")]
    InvalidHexEncoding,

    /// Reading or writing a key file failed.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
