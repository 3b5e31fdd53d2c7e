//! Transport representation of signatures.
//!
//! Scalars travel as decimal strings (the verifier contract takes `uint256`
//! arguments); points travel as hex compressed SEC1 encodings.
//!
//! ```json
//! { "s": "1234…", "challenge": "5678…", "public_key": "02ab…", "r": "03cd…" }
//! ```

use custody_types::{CustodyError, Result};
use k256::{Scalar, elliptic_curve::PrimeField};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::{
    keys::PublicKey,
    sign::{CombinedSignature, PartialSignature},
};

/// Decimal string of a scalar.
#[must_use]
pub fn scalar_to_decimal(scalar: &Scalar) -> String {
    BigUint::from_bytes_be(&scalar.to_bytes()).to_str_radix(10)
}

/// Parse a decimal string into a canonical scalar (must be below the group order).
pub fn scalar_from_decimal(s: &str) -> Result<Scalar> {
    let value = BigUint::parse_bytes(s.trim().as_bytes(), 10).ok_or_else(|| {
        CustodyError::InvalidScalar {
            reason: format!("not a decimal integer: {s}"),
        }
    })?;
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(CustodyError::InvalidScalar {
            reason: "wider than 256 bits".into(),
        });
    }
    let mut repr = [0u8; 32];
    repr[32 - bytes.len()..].copy_from_slice(&bytes);
    Option::from(Scalar::from_repr(repr.into())).ok_or_else(|| CustodyError::InvalidScalar {
        reason: "not below the group order".into(),
    })
}

/// Wire form of a partial or combined signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureWire {
    /// `s` as a decimal string.
    pub s: String,
    /// `e` as a decimal string.
    pub challenge: String,
    /// Signer key (partial) or aggregated key (combined), hex.
    pub public_key: String,
    /// Nonce point, hex. Required for third-party verification of a combined signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<String>,
}

impl SignatureWire {
    /// Wire form of a partial signature.
    #[must_use]
    pub fn from_partial(partial: &PartialSignature) -> Self {
        Self {
            s: scalar_to_decimal(&partial.s),
            challenge: scalar_to_decimal(&partial.challenge),
            public_key: partial.signer.to_hex(),
            r: Some(partial.nonce.to_hex()),
        }
    }

    /// Wire form of a combined signature over `aggregated_key`.
    #[must_use]
    pub fn from_combined(signature: &CombinedSignature, aggregated_key: &PublicKey) -> Self {
        Self {
            s: scalar_to_decimal(&signature.s),
            challenge: scalar_to_decimal(&signature.challenge),
            public_key: aggregated_key.to_hex(),
            r: Some(signature.nonce.to_hex()),
        }
    }

    fn nonce(&self) -> Result<PublicKey> {
        let r = self.r.as_deref().ok_or_else(|| CustodyError::InvalidPoint {
            reason: "signature carries no R".into(),
        })?;
        PublicKey::from_hex(r)
    }

    /// Decode into a partial signature.
    pub fn to_partial(&self) -> Result<PartialSignature> {
        Ok(PartialSignature {
            signer: PublicKey::from_hex(&self.public_key)?,
            nonce: self.nonce()?,
            s: scalar_from_decimal(&self.s)?,
            challenge: scalar_from_decimal(&self.challenge)?,
        })
    }

    /// Decode into a combined signature and the key it claims to verify under.
    pub fn to_combined(&self) -> Result<(CombinedSignature, PublicKey)> {
        let signature = CombinedSignature {
            nonce: self.nonce()?,
            s: scalar_from_decimal(&self.s)?,
            challenge: scalar_from_decimal(&self.challenge)?,
        };
        Ok((signature, PublicKey::from_hex(&self.public_key)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyPair, Round1Nonces, SigningSession, aggregate_keys, combine};
    use rand::rngs::OsRng;

    #[test]
    fn decimal_small_values() {
        assert_eq!(scalar_to_decimal(&Scalar::ZERO), "0");
        assert_eq!(scalar_to_decimal(&Scalar::from(1234u64)), "1234");
        assert_eq!(scalar_from_decimal("1234").unwrap(), Scalar::from(1234u64));
    }

    #[test]
    fn decimal_rejects_garbage_and_overflow() {
        assert!(scalar_from_decimal("12ab").is_err());
        // secp256k1 group order n itself is not a canonical scalar.
        let n = "115792089237316195423570985008687907852837564279074904382605163141518161494337";
        assert!(scalar_from_decimal(n).is_err());
        let too_wide = "1".repeat(90);
        assert!(scalar_from_decimal(&too_wide).is_err());
    }

    #[test]
    fn combined_signature_verifies_after_transport() {
        let keys: Vec<KeyPair> = (0..2).map(|_| KeyPair::generate(&mut OsRng)).collect();
        let pubs: Vec<_> = keys.iter().map(KeyPair::public_key).collect();
        let aggregated = aggregate_keys(&pubs).unwrap();

        let mut sessions: Vec<_> = keys.iter().map(|k| SigningSession::new(k, b"wire")).collect();
        let mut round1 = Round1Nonces::new();
        for s in &mut sessions {
            round1.insert(s.signer(), s.commit(&mut OsRng, 1).unwrap());
        }
        let partials: Vec<_> = sessions
            .iter_mut()
            .map(|s| s.sign(&aggregated, &round1).unwrap())
            .collect();

        let wired: Vec<String> = partials
            .iter()
            .map(|p| serde_json::to_string(&SignatureWire::from_partial(p)).unwrap())
            .collect();
        let received: Vec<PartialSignature> = wired
            .iter()
            .map(|j| serde_json::from_str::<SignatureWire>(j).unwrap().to_partial().unwrap())
            .collect();
        assert_eq!(received, partials);

        let combined = combine(&aggregated, &received).unwrap();
        let wire = SignatureWire::from_combined(&combined, &aggregated.public_key());
        let (sig, key) = wire.to_combined().unwrap();
        assert!(sig.verify(&key, b"wire"));
    }

    #[test]
    fn combined_without_r_is_rejected() {
        let wire = SignatureWire {
            s: "1".into(),
            challenge: "2".into(),
            public_key: KeyPair::generate(&mut OsRng).public_key().to_hex(),
            r: None,
        };
        assert!(wire.to_combined().is_err());
    }
}
