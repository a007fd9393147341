//! Uncompressed EC point codec for P-256.
//!
//! Points travel as `0x04 || X || Y` with each coordinate exactly
//! [`FIELD_SIZE`] bytes. Coordinates coming from a big-integer encoding may be
//! one byte longer (a leading sign byte) or shorter (leading zeros stripped);
//! [`fit_coordinate`] normalises both cases.

use crate::{Error, Result};
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, FieldBytes, PublicKey};

/// Size of one P-256 field element in bytes.
pub const FIELD_SIZE: usize = 32;

/// Size of an uncompressed encoded point: marker + X + Y.
pub const ENCODED_POINT_LEN: usize = 1 + 2 * FIELD_SIZE;

/// SEC 1 marker for an uncompressed point.
pub const UNCOMPRESSED_MARKER: u8 = 0x04;

/// Fit a big-endian coordinate to exactly [`FIELD_SIZE`] bytes.
///
/// Longer inputs lose their leading excess bytes, which must be zero (a sign
/// byte); shorter inputs are left-padded with zeros.
///
/// # Errors
///
/// Returns `Error::InvalidPublicKey` if a dropped leading byte is non-zero,
/// which would change the coordinate's value.
///
/// # Example
///
/// ```
/// use ptls_crypto::point::fit_coordinate;
///
/// let short = fit_coordinate(&[0x01, 0x02]).unwrap();
/// assert_eq!(&short[30..], &[0x01, 0x02]);
/// assert!(short[..30].iter().all(|&b| b == 0));
/// ```
pub fn fit_coordinate(bytes: &[u8]) -> Result<[u8; FIELD_SIZE]> {
    let mut out = [0u8; FIELD_SIZE];
    if bytes.len() >= FIELD_SIZE {
        let excess = bytes.len() - FIELD_SIZE;
        if bytes[..excess].iter().any(|&b| b != 0) {
            return Err(Error::InvalidPublicKey(format!(
                "coordinate of {} bytes does not fit in {FIELD_SIZE}",
                bytes.len()
            )));
        }
        out.copy_from_slice(&bytes[excess..]);
    } else {
        out[FIELD_SIZE - bytes.len()..].copy_from_slice(bytes);
    }
    Ok(out)
}

/// Encode raw big-endian coordinates as an uncompressed point.
///
/// No curve check is performed here; use [`decode_public_key`] on the result
/// to validate it.
pub fn encode_coordinates(x: &[u8], y: &[u8]) -> Result<[u8; ENCODED_POINT_LEN]> {
    let mut out = [0u8; ENCODED_POINT_LEN];
    out[0] = UNCOMPRESSED_MARKER;
    out[1..1 + FIELD_SIZE].copy_from_slice(&fit_coordinate(x)?);
    out[1 + FIELD_SIZE..].copy_from_slice(&fit_coordinate(y)?);
    Ok(out)
}

/// Split an uncompressed point back into its fixed-width coordinates.
///
/// # Errors
///
/// Returns an error if the length is not [`ENCODED_POINT_LEN`] or the marker
/// byte is not `0x04`.
pub fn decode_coordinates(bytes: &[u8]) -> Result<([u8; FIELD_SIZE], [u8; FIELD_SIZE])> {
    if bytes.len() != ENCODED_POINT_LEN {
        return Err(Error::InvalidLength {
            expected: ENCODED_POINT_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[0] != UNCOMPRESSED_MARKER {
        return Err(Error::InvalidPublicKey(format!(
            "expected uncompressed marker 0x04, got {:#04x}",
            bytes[0]
        )));
    }

    let mut x = [0u8; FIELD_SIZE];
    let mut y = [0u8; FIELD_SIZE];
    x.copy_from_slice(&bytes[1..1 + FIELD_SIZE]);
    y.copy_from_slice(&bytes[1 + FIELD_SIZE..]);
    Ok((x, y))
}

/// Encode a public key in the wire format.
pub fn encode_public_key(key: &PublicKey) -> [u8; ENCODED_POINT_LEN] {
    let encoded = key.to_encoded_point(false);
    let mut out = [0u8; ENCODED_POINT_LEN];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Decode and validate a public key from the wire format.
///
/// # Errors
///
/// Returns an error if the encoding is malformed or the point is not on the
/// P-256 curve.
pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey> {
    let (x, y) = decode_coordinates(bytes)?;
    let point = EncodedPoint::from_affine_coordinates(
        &FieldBytes::clone_from_slice(&x),
        &FieldBytes::clone_from_slice(&y),
        false,
    );

    Option::<PublicKey>::from(PublicKey::from_encoded_point(&point))
        .ok_or_else(|| Error::InvalidPublicKey("point is not on the P-256 curve".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::SecretKey;
    use proptest::prelude::*;

    #[test]
    fn test_fit_coordinate_drops_sign_byte() {
        let mut long = vec![0x00];
        long.extend_from_slice(&[0xff; FIELD_SIZE]);
        assert_eq!(fit_coordinate(&long).unwrap(), [0xff; FIELD_SIZE]);
    }

    #[test]
    fn test_fit_coordinate_rejects_significant_excess() {
        let mut long = vec![0x01];
        long.extend_from_slice(&[0xff; FIELD_SIZE]);
        assert!(fit_coordinate(&long).is_err());
    }

    #[test]
    fn test_fit_coordinate_empty_is_zero() {
        assert_eq!(fit_coordinate(&[]).unwrap(), [0u8; FIELD_SIZE]);
    }

    #[test]
    fn test_public_key_roundtrip() {
        let secret = SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key();

        let encoded = encode_public_key(&public);
        assert_eq!(encoded[0], UNCOMPRESSED_MARKER);
        assert_eq!(decode_public_key(&encoded).unwrap(), public);
    }

    #[test]
    fn test_decode_rejects_compressed_marker() {
        let secret = SecretKey::random(&mut rand::rngs::OsRng);
        let mut encoded = encode_public_key(&secret.public_key());
        encoded[0] = 0x02;
        assert!(decode_public_key(&encoded).is_err());
    }

    #[test]
    fn test_decode_rejects_off_curve_point() {
        let encoded = encode_coordinates(&[0x01], &[0x01]).unwrap();
        assert!(matches!(
            decode_public_key(&encoded),
            Err(Error::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(matches!(
            decode_public_key(&[UNCOMPRESSED_MARKER; 64]),
            Err(Error::InvalidLength {
                expected: ENCODED_POINT_LEN,
                actual: 64
            })
        ));
    }

    proptest! {
        /// Coordinates survive encode/decode whether their big-integer form
        /// is shorter than the field (leading zeros stripped) or longer
        /// (sign byte prepended).
        #[test]
        fn prop_coordinate_roundtrip(
            x in any::<[u8; FIELD_SIZE]>(),
            y in any::<[u8; FIELD_SIZE]>(),
            sign_x in any::<bool>(),
            sign_y in any::<bool>(),
        ) {
            let natural = |c: &[u8; FIELD_SIZE], sign: bool| -> Vec<u8> {
                let stripped: Vec<u8> = c.iter().copied().skip_while(|&b| b == 0).collect();
                if sign {
                    let mut v = vec![0x00];
                    v.extend_from_slice(c);
                    v
                } else {
                    stripped
                }
            };

            let encoded = encode_coordinates(&natural(&x, sign_x), &natural(&y, sign_y)).unwrap();
            let (dx, dy) = decode_coordinates(&encoded).unwrap();
            prop_assert_eq!(dx, x);
            prop_assert_eq!(dy, y);
        }
    }
}
