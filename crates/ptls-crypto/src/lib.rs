//! Cryptographic primitives for the ptls lock channel.
//!
//! This crate implements the cipher suite shared by both ends of the channel:
//! - Key agreement (ECDH over NIST P-256)
//! - EC point encoding (uncompressed SEC 1, fixed-width coordinates)
//! - Running handshake transcript (SHA-256)
//! - Traffic-secret derivation (HMAC-SHA256 over label and transcript hash)
//! - Record protection (`MessageCipher`, AES-128-GCM with a counter nonce)
//! - ECDSA P-256 / SHA-256 signature verification (DER encoded)
//!
//! Security requirements:
//! - No unsafe code
//! - All secrets use Zeroizing wrappers
//! - No logging of key material

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod kex;
pub mod point;
pub mod signature;
pub mod suite;
pub mod transcript;

pub use aead::{CipherMode, MessageCipher};
pub use error::{Error, Result};
pub use kdf::TrafficLabel;
pub use transcript::Transcript;
