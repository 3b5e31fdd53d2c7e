//! MuSig-style key aggregation.
//!
//! ```text
//! L   = keccak256( P_1 || P_2 || ... || P_n )      keys sorted ascending, uncompressed
//! a_i = keccak256( L || P_i ) mod n
//! X   = Σ a_i · P_i
//! ```
//!
//! Sorting makes the result independent of the order callers supply keys in.

use std::collections::BTreeMap;

use custody_types::{CustodyError, Result};
use k256::{ProjectivePoint, Scalar};

use crate::{hash::hash_to_scalar, keys::PublicKey};

/// The combined public key of a signing group and each member's coefficient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedKey {
    key: PublicKey,
    coefficients: BTreeMap<PublicKey, Scalar>,
}

impl AggregatedKey {
    /// The aggregated public point `X`.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.key
    }

    /// Aggregation coefficient `a_i` of a participant.
    #[must_use]
    pub fn coefficient(&self, participant: &PublicKey) -> Option<Scalar> {
        self.coefficients.get(participant).copied()
    }

    /// Participants in canonical order.
    pub fn participants(&self) -> impl Iterator<Item = &PublicKey> {
        self.coefficients.keys()
    }

    #[must_use]
    pub fn contains(&self, participant: &PublicKey) -> bool {
        self.coefficients.contains_key(participant)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

/// Aggregate participant keys into one [`AggregatedKey`].
///
/// # Errors
/// - [`CustodyError::EmptyKeySet`] for an empty slice
/// - [`CustodyError::DuplicateParticipant`] if a key appears twice
pub fn aggregate_keys(keys: &[PublicKey]) -> Result<AggregatedKey> {
    if keys.is_empty() {
        return Err(CustodyError::EmptyKeySet);
    }

    let mut sorted = keys.to_vec();
    sorted.sort();
    if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(CustodyError::DuplicateParticipant {
            key_hex: pair[0].to_hex(),
        });
    }

    let encodings: Vec<[u8; 65]> = sorted.iter().map(PublicKey::to_uncompressed).collect();
    let concatenated = encodings.concat();
    let salt = crate::hash::keccak256(&[&concatenated]);

    let mut coefficients = BTreeMap::new();
    let mut combined = ProjectivePoint::IDENTITY;
    for (key, encoding) in sorted.iter().zip(&encodings) {
        let a_i = hash_to_scalar(&[&salt, encoding]);
        combined += key.projective() * a_i;
        coefficients.insert(*key, a_i);
    }

    let key = PublicKey::from_point(combined)?;
    tracing::debug!(
        participants = coefficients.len(),
        aggregated = %key,
        "Aggregated participant keys"
    );

    Ok(AggregatedKey { key, coefficients })
}
