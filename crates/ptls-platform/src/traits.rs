//! Capability traits for the long-term identity key.
//!
//! These traits replace a process-wide keystore with an injected provider so
//! sessions can be tested with in-memory keys.

use crate::error::Result;
use ptls_crypto::point::ENCODED_POINT_LEN;
use std::sync::Arc;

/// Handle to a long-term ECDSA P-256 identity key.
///
/// Platform implementations keep the private key in secure storage
/// (Android KeyStore, Secure Enclave) and only expose signing.
///
/// # Security Requirements
///
/// - The private key must never be exported through this trait
/// - Signatures must be ECDSA over SHA-256, DER encoded
pub trait IdentityKey: Send + Sync {
    /// Public key in uncompressed SEC 1 form (65 bytes: 0x04 || x || y).
    fn public_key(&self) -> [u8; ENCODED_POINT_LEN];

    /// Sign `message` with ECDSA P-256 / SHA-256.
    ///
    /// Returns the ASN.1 DER encoded signature.
    ///
    /// # Errors
    ///
    /// - `Error::Signing` if the platform signer rejects the request
    /// - `Error::Keystore` if the key handle became invalid
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Provides the mobile's long-term identity key.
///
/// The public half is registered with the lock owner's backend out of band;
/// the handshake signs with the private half to prove it holds the key named
/// in the device certificate.
///
/// # Example
///
/// ```
/// use ptls_platform::mock::MockKeyProvider;
/// use ptls_platform::traits::IdentityKeyProvider;
///
/// # fn example() -> Result<(), ptls_platform::Error> {
/// let provider = MockKeyProvider::new_deterministic();
/// let identity = provider.get_identity()?.expect("provisioned");
/// let der = identity.sign(b"challenge")?;
/// assert_eq!(der[0], 0x30);
/// # Ok(())
/// # }
/// ```
pub trait IdentityKeyProvider: Send + Sync {
    /// Returns the stored identity key, or `None` if none was provisioned.
    ///
    /// # Errors
    ///
    /// - `Error::Keystore` if the store exists but cannot be read
    /// - `Error::Unavailable` if the platform has no secure key storage
    fn get_identity(&self) -> Result<Option<Arc<dyn IdentityKey>>>;

    /// Creates and stores a fresh identity key, replacing any existing one.
    ///
    /// Used during mobile registration, before any certificate exists.
    fn generate_identity(&self) -> Result<Arc<dyn IdentityKey>>;
}
