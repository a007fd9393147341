//! Ephemeral ECDH-P256 key agreement.
//!
//! A fresh [`EcdhP256KeyPair`] is generated for every handshake attempt and
//! dropped once the traffic ciphers have been derived.
//!
//! # Security
//!
//! - The secret scalar is zeroed when the key pair is dropped.
//! - Shared secrets are returned in `Zeroizing<>`.
//! - Peer points are validated against the curve before use.
//!
//! # Example
//!
//! ```
//! use ptls_crypto::kex::EcdhP256KeyPair;
//!
//! # fn example() -> Result<(), ptls_crypto::Error> {
//! let client = EcdhP256KeyPair::generate()?;
//! let lock = EcdhP256KeyPair::generate()?;
//!
//! let client_shared = client.exchange_encoded(lock.public_key())?;
//! let lock_shared = lock.exchange_encoded(client.public_key())?;
//!
//! assert_eq!(*client_shared, *lock_shared);
//! # Ok(())
//! # }
//! ```

use crate::point::{self, ENCODED_POINT_LEN, FIELD_SIZE};
use crate::{Error, Result};
use p256::ecdh::diffie_hellman;
use p256::{PublicKey, SecretKey};
use zeroize::Zeroizing;

/// ECDH-P256 key pair for one handshake attempt.
///
/// Public keys are encoded in uncompressed form: 0x04 || x || y (65 bytes).
pub struct EcdhP256KeyPair {
    /// Secret key, zeroed on drop.
    secret_key: SecretKey,
    /// Public key in wire form, cached.
    public_key_bytes: [u8; ENCODED_POINT_LEN],
}

impl EcdhP256KeyPair {
    /// Generate a new random P-256 key pair using the OS RNG.
    ///
    /// # Example
    ///
    /// ```
    /// use ptls_crypto::kex::EcdhP256KeyPair;
    ///
    /// let keypair = EcdhP256KeyPair::generate().unwrap();
    /// assert_eq!(keypair.public_key().len(), 65);
    /// assert_eq!(keypair.public_key()[0], 0x04);
    /// ```
    pub fn generate() -> Result<Self> {
        let secret_key = SecretKey::random(&mut rand::rngs::OsRng);
        let public_key_bytes = point::encode_public_key(&secret_key.public_key());

        Ok(Self {
            secret_key,
            public_key_bytes,
        })
    }

    /// Create a key pair from an existing 32-byte private scalar.
    ///
    /// Used with fixed test vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the scalar is the wrong size or out of range.
    pub fn from_private(private_key: &[u8]) -> Result<Self> {
        if private_key.len() != FIELD_SIZE {
            return Err(Error::InvalidLength {
                expected: FIELD_SIZE,
                actual: private_key.len(),
            });
        }

        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|_| Error::InvalidPrivateKey("scalar out of range for P-256".into()))?;
        let public_key_bytes = point::encode_public_key(&secret_key.public_key());

        Ok(Self {
            secret_key,
            public_key_bytes,
        })
    }

    /// Public key in wire form (65 bytes: 0x04 || x || y).
    pub fn public_key(&self) -> &[u8; ENCODED_POINT_LEN] {
        &self.public_key_bytes
    }

    /// Compute the shared secret with an already validated peer key.
    ///
    /// The result is the 32-byte x-coordinate of the shared point.
    pub fn exchange(&self, peer_public: &PublicKey) -> Zeroizing<[u8; FIELD_SIZE]> {
        let shared_secret =
            diffie_hellman(self.secret_key.to_nonzero_scalar(), peer_public.as_affine());

        let mut result = [0u8; FIELD_SIZE];
        result.copy_from_slice(shared_secret.raw_secret_bytes().as_slice());
        Zeroizing::new(result)
    }

    /// Decode a peer key from wire form and compute the shared secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer point is malformed or not on the curve.
    pub fn exchange_encoded(&self, peer_public: &[u8]) -> Result<Zeroizing<[u8; FIELD_SIZE]>> {
        let peer = point::decode_public_key(peer_public)
            .map_err(|e| Error::KeyExchange(format!("peer public key rejected: {e}")))?;
        Ok(self.exchange(&peer))
    }
}

impl core::fmt::Debug for EcdhP256KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EcdhP256KeyPair")
            .field("public_key", &self.public_key_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test ECDH-P256 key exchange commutativity: client->lock == lock->client
    #[test]
    fn test_key_exchange_commutativity() {
        let client = EcdhP256KeyPair::generate().unwrap();
        let lock = EcdhP256KeyPair::generate().unwrap();

        let client_shared = client.exchange_encoded(lock.public_key()).unwrap();
        let lock_shared = lock.exchange_encoded(client.public_key()).unwrap();

        assert_eq!(&*client_shared, &*lock_shared);
    }

    /// Test deterministic key derivation from private key
    #[test]
    fn test_deterministic() {
        let private_key = [0x42u8; 32];

        let keypair1 = EcdhP256KeyPair::from_private(&private_key).unwrap();
        let keypair2 = EcdhP256KeyPair::from_private(&private_key).unwrap();

        assert_eq!(keypair1.public_key(), keypair2.public_key());
    }

    /// Test rejection of a zero scalar
    #[test]
    fn test_reject_zero_private_key() {
        assert!(EcdhP256KeyPair::from_private(&[0u8; 32]).is_err());
    }

    /// Test rejection of invalid public key length
    #[test]
    fn test_reject_invalid_public_key_length() {
        let keypair = EcdhP256KeyPair::generate().unwrap();
        let result = keypair.exchange_encoded(&[0x04; 64]);
        assert!(matches!(result, Err(Error::KeyExchange(_))));
    }

    /// Test rejection of compressed public key format
    #[test]
    fn test_reject_compressed_format() {
        let keypair = EcdhP256KeyPair::generate().unwrap();
        let mut invalid_public = [0x02; 65];
        invalid_public[0] = 0x02;
        assert!(keypair.exchange_encoded(&invalid_public).is_err());
    }

    /// Test different attempts produce different shared secrets
    #[test]
    fn test_unique_shared_secrets() {
        let lock = EcdhP256KeyPair::generate().unwrap();
        let first = EcdhP256KeyPair::generate().unwrap();
        let second = EcdhP256KeyPair::generate().unwrap();

        let shared1 = first.exchange_encoded(lock.public_key()).unwrap();
        let shared2 = second.exchange_encoded(lock.public_key()).unwrap();

        assert_ne!(&*shared1, &*shared2);
    }
}
