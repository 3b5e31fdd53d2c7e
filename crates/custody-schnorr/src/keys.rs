//! Party key material.
//!
//! A [`KeyPair`] is created once per party and never mutated. [`PublicKey`]
//! orders by the numeric value of its uncompressed `x || y` encoding, which is
//! the canonical order used by key aggregation.

use std::{cmp::Ordering, fmt, hash};

use custody_types::{CustodyError, Result};
use k256::{
    AffinePoint, EncodedPoint, NonZeroScalar, ProjectivePoint, Scalar,
    elliptic_curve::{
        PrimeField,
        sec1::{FromEncodedPoint, ToEncodedPoint},
    },
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// A non-identity secp256k1 point used as a participant key or nonce commitment.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PublicKey {
    point: AffinePoint,
    uncompressed: [u8; 65],
}

impl PublicKey {
    /// Wrap a projective point, rejecting the identity.
    pub fn from_point(point: ProjectivePoint) -> Result<Self> {
        let affine = point.to_affine();
        let encoded = affine.to_encoded_point(false);
        let uncompressed: [u8; 65] =
            encoded
                .as_bytes()
                .try_into()
                .map_err(|_| CustodyError::InvalidPoint {
                    reason: "identity point".into(),
                })?;
        Ok(Self {
            point: affine,
            uncompressed,
        })
    }

    /// Parse a SEC1 encoding (compressed or uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        let encoded = EncodedPoint::from_bytes(bytes).map_err(|e| CustodyError::InvalidPoint {
            reason: e.to_string(),
        })?;
        let affine: AffinePoint = Option::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or_else(|| CustodyError::InvalidPoint {
                reason: "not on curve".into(),
            })?;
        Self::from_point(ProjectivePoint::from(affine))
    }

    /// Parse a hex SEC1 encoding, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| CustodyError::InvalidPoint {
            reason: e.to_string(),
        })?;
        Self::from_sec1_bytes(&bytes)
    }

    #[must_use]
    pub fn affine(&self) -> &AffinePoint {
        &self.point
    }

    #[must_use]
    pub fn projective(&self) -> ProjectivePoint {
        ProjectivePoint::from(self.point)
    }

    /// 65-byte `0x04 || x || y` encoding.
    #[must_use]
    pub fn to_uncompressed(&self) -> [u8; 65] {
        self.uncompressed
    }

    /// 33-byte compressed encoding.
    #[must_use]
    pub fn to_compressed(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = if self.uncompressed[64] & 1 == 1 { 0x03 } else { 0x02 };
        out[1..].copy_from_slice(&self.uncompressed[1..33]);
        out
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed())
    }

    /// Short hex prefix for logs.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.to_compressed()[..5])
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.uncompressed == other.uncompressed
    }
}

impl Eq for PublicKey {}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uncompressed.cmp(&other.uncompressed)
    }
}

impl hash::Hash for PublicKey {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.uncompressed.hash(state);
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", self.short())
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

impl TryFrom<String> for PublicKey {
    type Error = CustodyError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

// ---------------------------------------------------------------------------
// KeyPair
// ---------------------------------------------------------------------------

/// A party's signing key. The secret never leaves this struct except through
/// [`SigningSession`](crate::SigningSession).
pub struct KeyPair {
    secret: NonZeroScalar,
    public: PublicKey,
}

impl KeyPair {
    /// Draw a fresh key from a cryptographically secure RNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = NonZeroScalar::random(rng);
        Self::from_nonzero(secret)
    }

    /// Load a key from its 32-byte big-endian secret.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let scalar: Scalar = Option::from(Scalar::from_repr((*bytes).into())).ok_or_else(|| {
            CustodyError::InvalidScalar {
                reason: "secret exceeds group order".into(),
            }
        })?;
        let secret: NonZeroScalar = Option::from(NonZeroScalar::new(scalar)).ok_or_else(|| {
            CustodyError::InvalidScalar {
                reason: "secret is zero".into(),
            }
        })?;
        Ok(Self::from_nonzero(secret))
    }

    fn from_nonzero(secret: NonZeroScalar) -> Self {
        let point = ProjectivePoint::GENERATOR * *secret;
        let affine = point.to_affine();
        let encoded = affine.to_encoded_point(false);
        let mut uncompressed = [0u8; 65];
        uncompressed.copy_from_slice(encoded.as_bytes());
        Self {
            secret,
            public: PublicKey {
                point: affine,
                uncompressed,
            },
        }
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub(crate) fn secret_scalar(&self) -> Scalar {
        *self.secret
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}
