//! Round-1 nonce material.
//!
//! A [`NonceSet`] holds `v` single-use secret scalars and their public points.
//! It is deliberately not `Clone`: the only way to use the secrets is to move
//! the set into [`SigningSession::sign`](crate::SigningSession::sign), and the
//! secrets are zeroized when the set is dropped.
//!
//! Binding: each party's nonces are folded into one effective nonce with a
//! geometric weighting of its binding coefficient `b`:
//!
//! ```text
//! b     = keccak256( N_1 || ... || N_v || message ) mod n     (compressed N_j)
//! R_i   = Σ_j N_j · b^j                                        j = 0..v-1
//! k_eff = Σ_j k_j · b^j
//! ```

use custody_types::{CustodyError, Result};
use k256::{NonZeroScalar, ProjectivePoint, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{hash::hash_to_scalar, keys::PublicKey};

/// The public half of a party's nonce set, broadcast in round 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicNonces(Vec<PublicKey>);

impl PublicNonces {
    /// Build from received points. Empty sets are rejected.
    pub fn new(points: Vec<PublicKey>) -> Result<Self> {
        if points.is_empty() {
            return Err(CustodyError::NonceCountMismatch {
                expected: 1,
                actual: 0,
            });
        }
        Ok(Self(points))
    }

    #[must_use]
    pub fn points(&self) -> &[PublicKey] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Binding coefficient `b` of this set for `message`.
    #[must_use]
    pub fn binding_coefficient(&self, message: &[u8]) -> Scalar {
        let mut preimage = Vec::with_capacity(self.0.len() * 33 + message.len());
        for point in &self.0 {
            preimage.extend_from_slice(&point.to_compressed());
        }
        preimage.extend_from_slice(message);
        hash_to_scalar(&[&preimage])
    }

    /// Effective nonce point `R_i = Σ_j N_j · b^j`.
    #[must_use]
    pub fn effective_point(&self, binding: &Scalar) -> ProjectivePoint {
        let mut weight = Scalar::ONE;
        let mut acc = ProjectivePoint::IDENTITY;
        for point in &self.0 {
            acc += point.projective() * weight;
            weight *= *binding;
        }
        acc
    }
}

/// Secret round-1 nonces for one signing attempt.
pub struct NonceSet {
    secrets: Vec<Scalar>,
    public: PublicNonces,
}

impl NonceSet {
    /// Draw `count` fresh nonces.
    ///
    /// # Errors
    /// Returns [`CustodyError::NonceCountMismatch`] if `count` is zero.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(CustodyError::NonceCountMismatch {
                expected: 1,
                actual: 0,
            });
        }
        let mut secrets = Vec::with_capacity(count);
        let mut points = Vec::with_capacity(count);
        for _ in 0..count {
            let k = NonZeroScalar::random(&mut *rng);
            points.push(PublicKey::from_point(ProjectivePoint::GENERATOR * *k)?);
            secrets.push(*k);
        }
        Ok(Self {
            secrets,
            public: PublicNonces(points),
        })
    }

    #[must_use]
    pub fn public(&self) -> &PublicNonces {
        &self.public
    }

    /// Effective secret nonce `k_eff = Σ_j k_j · b^j`.
    pub(crate) fn effective_secret(&self, binding: &Scalar) -> Scalar {
        let mut weight = Scalar::ONE;
        let mut acc = Scalar::ZERO;
        for k in &self.secrets {
            acc += *k * weight;
            weight *= *binding;
        }
        acc
    }
}

impl Zeroize for NonceSet {
    fn zeroize(&mut self) {
        self.secrets.zeroize();
    }
}

impl Drop for NonceSet {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for NonceSet {}

impl std::fmt::Debug for NonceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceSet")
            .field("public", &self.public)
            .field("secrets", &"<redacted>")
            .finish()
    }
}
