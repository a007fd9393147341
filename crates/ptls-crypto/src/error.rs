//! Error types for cryptographic operations.

use thiserror::Error;

/// Result type alias for cryptographic operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Key exchange failed.
    #[error("Key exchange failed: {0}")]
    KeyExchange(String),

    /// AEAD encryption failed.
    #[error("AEAD encryption failed: {0}")]
    Encryption(String),

    /// AEAD decryption failed (tag mismatch or truncated record).
    #[error("AEAD decryption failed: {0}")]
    Decryption(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Invalid input length.
    #[error("Invalid input length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length received in bytes.
        actual: usize,
    },

    /// Invalid private key.
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key or EC point encoding.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signature bytes are not a well-formed DER ECDSA signature.
    #[error("Invalid signature encoding: {0}")]
    InvalidSignature(String),

    /// The cipher has used every nonce it is allowed to.
    #[error("Nonce counter exhausted after {limit} messages")]
    NonceExhausted {
        /// Number of messages the cipher was allowed to process.
        limit: u32,
    },

    /// A cipher was asked to transform in the direction it was not built for.
    #[error("Cipher built for {expected} used for {actual}")]
    WrongMode {
        /// Mode the cipher was built with.
        expected: &'static str,
        /// Mode requested by the caller.
        actual: &'static str,
    },
}
