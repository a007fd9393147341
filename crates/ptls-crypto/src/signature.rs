//! ECDSA P-256 / SHA-256 signature verification.
//!
//! Signatures on the wire are ASN.1 DER encoded, as produced by the lock and
//! by platform keystores. High-S signatures are accepted.

use crate::point;
use crate::{Error, Result};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};

/// Verify a DER signature over `message` with a wire-form public key.
///
/// Returns `Ok(false)` when the signature is well formed but does not match.
///
/// # Errors
///
/// Returns an error if the public key or the DER encoding is malformed.
pub fn verify_der(public_key: &[u8], message: &[u8], der_signature: &[u8]) -> Result<bool> {
    let key = point::decode_public_key(public_key)?;
    let signature = Signature::from_der(der_signature)
        .map_err(|_| Error::InvalidSignature("malformed DER ECDSA signature".into()))?;

    Ok(VerifyingKey::from(&key)
        .verify(message, &signature)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::SigningKey;

    const PUBLIC_KEY: &str = "043ad3861a95621392516bb593ef05583ed2e5866f5cb6260a3017237fd89b90af\
                              d0961c7e37075a6791a39c61f56295b02b6d26567b615e60aa41ee1c8e83388d";
    const SIGNATURE: &str = "304502207c982a24f06c03cc5287965a5207765f7a6f68079fdbcbd53af23a1c24\
                             6de55d022100d1d0e142fe98b29a91d7c69e0abdd0f963bfad2c7a8d7c3ac9430653\
                             98c42552";
    const MESSAGE: &[u8] = b"ptls lock signature vector";

    #[test]
    fn test_known_vector_verifies() {
        let public_key = hex::decode(PUBLIC_KEY).unwrap();
        let signature = hex::decode(SIGNATURE).unwrap();
        assert!(verify_der(&public_key, MESSAGE, &signature).unwrap());
    }

    #[test]
    fn test_known_vector_wrong_message() {
        let public_key = hex::decode(PUBLIC_KEY).unwrap();
        let signature = hex::decode(SIGNATURE).unwrap();
        assert!(!verify_der(&public_key, b"tampered", &signature).unwrap());
    }

    #[test]
    fn test_generated_signature_roundtrip() {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let public_key =
            point::encode_public_key(&p256::PublicKey::from(signing_key.verifying_key()));
        let signature: Signature = signing_key.sign(b"hello");
        let der = signature.to_der();

        assert!(verify_der(&public_key, b"hello", der.as_bytes()).unwrap());
    }

    #[test]
    fn test_malformed_der_is_error() {
        let public_key = hex::decode(PUBLIC_KEY).unwrap();
        assert!(matches!(
            verify_der(&public_key, MESSAGE, &[0x30, 0x02, 0x00]),
            Err(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_malformed_key_is_error() {
        let signature = hex::decode(SIGNATURE).unwrap();
        assert!(verify_der(&[0x04; 65], MESSAGE, &signature).is_err());
    }
}
