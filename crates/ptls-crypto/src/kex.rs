//! Key exchange implementations.
//!
//! The lock channel uses ephemeral ECDH over P-256, one key pair per
//! handshake attempt.

pub mod ecdh_p256;

pub use self::ecdh_p256::EcdhP256KeyPair;
