//! Keccak-256 helpers and the challenge function shared with the on-chain verifier.
//!
//! The challenge preimage must match the verifier contract byte for byte:
//!
//! ```text
//! e = keccak256( address(R) || parity(X) || x(X) || message ) mod n
//! ```
//!
//! - `address(R)`: last 20 bytes of `keccak256(uncompressed R without 0x04)`
//! - `parity(X)`: 27 for even y, 28 for odd y
//! - `x(X)`: 32-byte big-endian x-coordinate of the aggregated key

use custody_types::constants::{PARITY_EVEN, PARITY_ODD};
use k256::{
    AffinePoint, FieldBytes, ProjectivePoint, Scalar,
    elliptic_curve::{bigint::U256, ops::Reduce, point::AffineCoordinates, sec1::ToEncodedPoint},
};
use tiny_keccak::{Hasher, Keccak};

/// Keccak-256 over the concatenation of `parts`.
#[must_use]
pub fn keccak256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Hash `parts` and reduce the digest into the scalar field.
#[must_use]
pub fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let digest = keccak256(parts);
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(digest))
}

/// EVM-style address of a point: last 20 bytes of the keccak of its
/// uncompressed coordinates.
#[must_use]
pub fn point_address(point: &ProjectivePoint) -> [u8; 20] {
    let encoded = point.to_affine().to_encoded_point(false);
    // Skip the 0x04 prefix; the identity encodes as a single byte.
    let coords = encoded.as_bytes().get(1..).unwrap_or_default();
    let hash = keccak256(&[coords]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Parity byte of a point's y-coordinate, in the verifier's 27/28 convention.
#[must_use]
pub fn parity_byte(point: &AffinePoint) -> u8 {
    if bool::from(point.y_is_odd()) {
        PARITY_ODD
    } else {
        PARITY_EVEN
    }
}

/// Fiat-Shamir challenge binding the aggregate nonce, the aggregated key and the message.
#[must_use]
pub fn challenge(nonce: &ProjectivePoint, aggregated_key: &AffinePoint, message: &[u8]) -> Scalar {
    let address = point_address(nonce);
    let parity = [parity_byte(aggregated_key)];
    let x = aggregated_key.x();
    hash_to_scalar(&[&address, &parity, x.as_slice(), message])
}
