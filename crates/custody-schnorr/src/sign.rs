//! Round 2: nonce aggregation, partial signing, combination and verification.
//!
//! ## Flow (per message)
//!
//! ```text
//! SigningSession::commit()  ──▶ broadcast PublicNonces
//!          (barrier: wait for every participant's PublicNonces)
//! SigningSession::sign()    ──▶ PartialSignature { R_i, s_i, e }
//! combine(partials)         ──▶ CombinedSignature { R, s, e }
//! verify(sig, X, message)   ──▶ bool
//! ```
//!
//! `s_i = k_eff + e · a_i · x_i mod n`, so `G·s = R + e·X` for the combined
//! signature, and the verifier recomputes `R' = G·s − e·X`.

use std::collections::BTreeMap;

use custody_types::{CustodyError, Result};
use k256::{ProjectivePoint, Scalar};
use rand::{CryptoRng, RngCore};

use crate::{
    aggregate::AggregatedKey,
    hash::challenge,
    keys::{KeyPair, PublicKey},
    nonce::{NonceSet, PublicNonces},
};

/// Round-1 broadcasts of every participant, keyed by participant key.
pub type Round1Nonces = BTreeMap<PublicKey, PublicNonces>;

/// One party's contribution `{R_i, s_i, e}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSignature {
    /// The signing participant.
    pub signer: PublicKey,
    /// The party's effective nonce point `R_i`.
    pub nonce: PublicKey,
    /// `s_i`.
    pub s: Scalar,
    /// The shared challenge `e`.
    pub challenge: Scalar,
}

/// The aggregate signature `{R, s, e}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedSignature {
    /// Aggregate nonce `R = Σ R_i`.
    pub nonce: PublicKey,
    /// `s = Σ s_i`.
    pub s: Scalar,
    /// Challenge `e`.
    pub challenge: Scalar,
}

impl CombinedSignature {
    /// Verify against an aggregated public key.
    #[must_use]
    pub fn verify(&self, aggregated_key: &PublicKey, message: &[u8]) -> bool {
        verify(self, aggregated_key, message)
    }
}

// ---------------------------------------------------------------------------
// Nonce aggregation
// ---------------------------------------------------------------------------

/// Per-message values every participant derives identically from the round-1 broadcasts.
#[derive(Debug, Clone)]
pub struct NonceAggregate {
    /// Aggregate nonce `R`.
    pub nonce: ProjectivePoint,
    /// Challenge `e`.
    pub challenge: Scalar,
    /// Binding coefficient and effective nonce per participant.
    effective: BTreeMap<PublicKey, (Scalar, ProjectivePoint)>,
}

impl NonceAggregate {
    /// Binding coefficient `b` of a participant.
    #[must_use]
    pub fn binding(&self, participant: &PublicKey) -> Option<Scalar> {
        self.effective.get(participant).map(|(b, _)| *b)
    }

    /// Effective nonce `R_i` of a participant.
    #[must_use]
    pub fn effective_nonce(&self, participant: &PublicKey) -> Option<ProjectivePoint> {
        self.effective.get(participant).map(|(_, r)| *r)
    }
}

/// Fold every participant's round-1 nonces into `R` and derive the challenge.
///
/// # Errors
/// - [`CustodyError::MissingParticipantNonces`] if a participant has not broadcast
/// - [`CustodyError::NotAParticipant`] if a set comes from outside the group
/// - [`CustodyError::NonceCountMismatch`] for an empty set
pub fn aggregate_nonces(
    aggregated: &AggregatedKey,
    round1: &Round1Nonces,
    message: &[u8],
) -> Result<NonceAggregate> {
    if let Some(outsider) = round1.keys().find(|k| !aggregated.contains(k)) {
        return Err(CustodyError::NotAParticipant {
            key_hex: outsider.to_hex(),
        });
    }

    let mut effective = BTreeMap::new();
    let mut nonce = ProjectivePoint::IDENTITY;
    for participant in aggregated.participants() {
        let nonces = round1
            .get(participant)
            .ok_or_else(|| CustodyError::MissingParticipantNonces {
                key_hex: participant.to_hex(),
            })?;
        if nonces.is_empty() {
            return Err(CustodyError::NonceCountMismatch {
                expected: 1,
                actual: 0,
            });
        }
        let b = nonces.binding_coefficient(message);
        let r_i = nonces.effective_point(&b);
        nonce += r_i;
        effective.insert(*participant, (b, r_i));
    }

    let e = challenge(&nonce, aggregated.public_key().affine(), message);
    Ok(NonceAggregate {
        nonce,
        challenge: e,
        effective,
    })
}

// ---------------------------------------------------------------------------
// SigningSession
// ---------------------------------------------------------------------------

enum NonceState {
    Fresh,
    Committed(NonceSet),
    Consumed,
}

/// One party's signing state for one message.
///
/// The session owns the party's [`NonceSet`] between round 1 and round 2 and
/// destroys it when the partial signature is produced.
pub struct SigningSession<'k> {
    key: &'k KeyPair,
    message: Vec<u8>,
    state: NonceState,
}

impl<'k> SigningSession<'k> {
    #[must_use]
    pub fn new(key: &'k KeyPair, message: &[u8]) -> Self {
        Self {
            key,
            message: message.to_vec(),
            state: NonceState::Fresh,
        }
    }

    #[must_use]
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    #[must_use]
    pub fn signer(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Round 1: draw `count` nonces and return the public set to broadcast.
    ///
    /// # Errors
    /// - [`CustodyError::NonceAlreadyPublished`] while an earlier commitment is pending
    /// - [`CustodyError::NonceAlreadyUsed`] after the session has signed
    pub fn commit<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        count: usize,
    ) -> Result<PublicNonces> {
        match self.state {
            NonceState::Fresh => {}
            NonceState::Committed(_) => {
                return Err(CustodyError::NonceAlreadyPublished {
                    key_hex: self.key.public_key().to_hex(),
                });
            }
            NonceState::Consumed => return Err(CustodyError::NonceAlreadyUsed),
        }
        let set = NonceSet::generate(rng, count)?;
        let public = set.public().clone();
        self.state = NonceState::Committed(set);
        tracing::debug!(
            signer = %self.key.public_key(),
            nonces = count,
            "Committed round-1 nonces"
        );
        Ok(public)
    }

    /// Drop pending nonces after an aborted round so a fresh commitment can be made.
    pub fn abort(&mut self) {
        if matches!(self.state, NonceState::Committed(_)) {
            self.state = NonceState::Fresh;
            tracing::debug!(signer = %self.key.public_key(), "Signing round aborted");
        }
    }

    /// Round 2: produce this party's partial signature. Consumes the nonces.
    ///
    /// # Errors
    /// - [`CustodyError::NoncesNotGenerated`] if [`commit`](Self::commit) was never called
    /// - [`CustodyError::NonceAlreadyUsed`] on a second call
    /// - any error of [`aggregate_nonces`]
    pub fn sign(
        &mut self,
        aggregated: &AggregatedKey,
        round1: &Round1Nonces,
    ) -> Result<PartialSignature> {
        let own = match &self.state {
            NonceState::Fresh => return Err(CustodyError::NoncesNotGenerated),
            NonceState::Consumed => return Err(CustodyError::NonceAlreadyUsed),
            NonceState::Committed(set) => set.public().clone(),
        };

        let signer = self.key.public_key();
        let a_i = aggregated
            .coefficient(&signer)
            .ok_or_else(|| CustodyError::NotAParticipant {
                key_hex: signer.to_hex(),
            })?;
        if round1.get(&signer) != Some(&own) {
            return Err(CustodyError::MissingParticipantNonces {
                key_hex: signer.to_hex(),
            });
        }

        let agg = aggregate_nonces(aggregated, round1, &self.message)?;
        let (b, r_i) = agg
            .effective
            .get(&signer)
            .copied()
            .ok_or_else(|| CustodyError::Internal("own nonces missing after aggregation".into()))?;

        // Nonces leave the session here and are dropped at the end of this scope.
        let NonceState::Committed(set) = std::mem::replace(&mut self.state, NonceState::Consumed)
        else {
            return Err(CustodyError::NoncesNotGenerated);
        };
        let k_eff = set.effective_secret(&b);
        let s = k_eff + agg.challenge * a_i * self.key.secret_scalar();
        drop(set);

        tracing::debug!(signer = %signer, "Produced partial signature");

        Ok(PartialSignature {
            signer,
            nonce: PublicKey::from_point(r_i)?,
            s,
            challenge: agg.challenge,
        })
    }
}

// ---------------------------------------------------------------------------
// Combine / verify
// ---------------------------------------------------------------------------

/// Sum partial signatures into the aggregate signature.
///
/// # Errors
/// - [`CustodyError::MissingPartialSignature`] if a participant's partial is absent
/// - [`CustodyError::NotAParticipant`] / [`CustodyError::DuplicateParticipant`] for stray partials
/// - [`CustodyError::ChallengeMismatch`] if partials disagree on `e`
pub fn combine(
    aggregated: &AggregatedKey,
    partials: &[PartialSignature],
) -> Result<CombinedSignature> {
    let mut by_signer: BTreeMap<PublicKey, &PartialSignature> = BTreeMap::new();
    for partial in partials {
        if !aggregated.contains(&partial.signer) {
            return Err(CustodyError::NotAParticipant {
                key_hex: partial.signer.to_hex(),
            });
        }
        if by_signer.insert(partial.signer, partial).is_some() {
            return Err(CustodyError::DuplicateParticipant {
                key_hex: partial.signer.to_hex(),
            });
        }
    }

    let mut s = Scalar::ZERO;
    let mut nonce = ProjectivePoint::IDENTITY;
    let mut challenge: Option<Scalar> = None;
    for participant in aggregated.participants() {
        let partial =
            by_signer
                .get(participant)
                .ok_or_else(|| CustodyError::MissingPartialSignature {
                    key_hex: participant.to_hex(),
                })?;
        match challenge {
            None => challenge = Some(partial.challenge),
            Some(e) if e != partial.challenge => return Err(CustodyError::ChallengeMismatch),
            Some(_) => {}
        }
        s += partial.s;
        nonce += partial.nonce.projective();
    }

    let challenge = challenge.ok_or(CustodyError::EmptyKeySet)?;
    let nonce = PublicKey::from_point(nonce)?;
    tracing::info!(
        participants = aggregated.len(),
        aggregated_key = %aggregated.public_key(),
        nonce = %nonce,
        "Combined threshold signature"
    );

    Ok(CombinedSignature {
        nonce,
        s,
        challenge,
    })
}

/// Verify a combined signature: recompute `R' = G·s − X·e` and accept iff
/// `challenge(R', X, message) == e`.
#[must_use]
pub fn verify(signature: &CombinedSignature, aggregated_key: &PublicKey, message: &[u8]) -> bool {
    let recomputed =
        ProjectivePoint::GENERATOR * signature.s - aggregated_key.projective() * signature.challenge;
    let e = challenge(&recomputed, aggregated_key.affine(), message);
    let ok = e == signature.challenge;
    if !ok {
        tracing::debug!(key = %aggregated_key, "Signature rejected: challenge mismatch");
    }
    ok
}

/// Check one party's contribution: `G·s_i == R_i + e·a_i·P_i`.
///
/// Lets the combiner identify which participant produced a bad share.
#[must_use]
pub fn verify_partial(
    partial: &PartialSignature,
    aggregated: &AggregatedKey,
    nonces: &NonceAggregate,
) -> bool {
    let Some(a_i) = aggregated.coefficient(&partial.signer) else {
        return false;
    };
    let Some(r_i) = nonces.effective_nonce(&partial.signer) else {
        return false;
    };
    if r_i != partial.nonce.projective() || partial.challenge != nonces.challenge {
        return false;
    }
    ProjectivePoint::GENERATOR * partial.s
        == r_i + partial.signer.projective() * (partial.challenge * a_i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate_keys;
    use rand::rngs::OsRng;

    struct Group {
        keys: Vec<KeyPair>,
        aggregated: AggregatedKey,
    }

    fn group(n: usize) -> Group {
        let keys: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate(&mut OsRng)).collect();
        let pubs: Vec<PublicKey> = keys.iter().map(KeyPair::public_key).collect();
        let aggregated = aggregate_keys(&pubs).unwrap();
        Group { keys, aggregated }
    }

    fn run(group: &Group, message: &[u8], v: usize) -> (Vec<PartialSignature>, CombinedSignature) {
        let mut sessions: Vec<SigningSession<'_>> = group
            .keys
            .iter()
            .map(|k| SigningSession::new(k, message))
            .collect();
        let mut round1 = Round1Nonces::new();
        for session in &mut sessions {
            let public = session.commit(&mut OsRng, v).unwrap();
            round1.insert(session.signer(), public);
        }
        let partials: Vec<PartialSignature> = sessions
            .iter_mut()
            .map(|s| s.sign(&group.aggregated, &round1).unwrap())
            .collect();
        let combined = combine(&group.aggregated, &partials).unwrap();
        (partials, combined)
    }

    #[test]
    fn two_party_hello_world() {
        let g = group(2);
        let (_, sig) = run(&g, b"hello world", 1);
        assert!(sig.verify(&g.aggregated.public_key(), b"hello world"));
        assert!(!sig.verify(&g.aggregated.public_key(), b"hello worle"));
    }

    #[test]
    fn many_parties_many_nonces() {
        for n in 2..=5 {
            for v in 1..=3 {
                let g = group(n);
                let (_, sig) = run(&g, b"custody", v);
                assert!(verify(&sig, &g.aggregated.public_key(), b"custody"), "n={n} v={v}");
            }
        }
    }

    #[test]
    fn tampered_s_or_challenge_rejected() {
        let g = group(3);
        let (_, sig) = run(&g, b"msg", 2);
        let key = g.aggregated.public_key();

        let mut bad_s = sig.clone();
        bad_s.s += Scalar::ONE;
        assert!(!verify(&bad_s, &key, b"msg"));

        let mut bad_e = sig.clone();
        bad_e.challenge += Scalar::ONE;
        assert!(!verify(&bad_e, &key, b"msg"));
    }

    #[test]
    fn wrong_key_rejected() {
        let g = group(2);
        let other = group(2);
        let (_, sig) = run(&g, b"msg", 1);
        assert!(!verify(&sig, &other.aggregated.public_key(), b"msg"));
    }

    #[test]
    fn partials_share_challenge_and_verify() {
        let g = group(3);
        let message = b"partials";
        let mut sessions: Vec<_> = g.keys.iter().map(|k| SigningSession::new(k, message)).collect();
        let mut round1 = Round1Nonces::new();
        for s in &mut sessions {
            round1.insert(s.signer(), s.commit(&mut OsRng, 2).unwrap());
        }
        let agg = aggregate_nonces(&g.aggregated, &round1, message).unwrap();
        for s in &mut sessions {
            let partial = s.sign(&g.aggregated, &round1).unwrap();
            assert_eq!(partial.challenge, agg.challenge);
            assert!(verify_partial(&partial, &g.aggregated, &agg));

            let mut forged = partial.clone();
            forged.s += Scalar::ONE;
            assert!(!verify_partial(&forged, &g.aggregated, &agg));
        }
    }

    #[test]
    fn sign_before_commit_fails_fast() {
        let g = group(2);
        let mut session = SigningSession::new(&g.keys[0], b"m");
        let err = session.sign(&g.aggregated, &Round1Nonces::new()).unwrap_err();
        assert!(matches!(err, CustodyError::NoncesNotGenerated));
    }

    #[test]
    fn nonces_are_single_use() {
        let g = group(2);
        let mut a = SigningSession::new(&g.keys[0], b"m");
        let mut b = SigningSession::new(&g.keys[1], b"m");
        let mut round1 = Round1Nonces::new();
        round1.insert(a.signer(), a.commit(&mut OsRng, 1).unwrap());
        round1.insert(b.signer(), b.commit(&mut OsRng, 1).unwrap());

        a.sign(&g.aggregated, &round1).unwrap();
        let err = a.sign(&g.aggregated, &round1).unwrap_err();
        assert!(matches!(err, CustodyError::NonceAlreadyUsed));
        let err = a.commit(&mut OsRng, 1).unwrap_err();
        assert!(matches!(err, CustodyError::NonceAlreadyUsed));
    }

    #[test]
    fn recommit_while_pending_rejected_until_abort() {
        let g = group(2);
        let mut a = SigningSession::new(&g.keys[0], b"m");
        a.commit(&mut OsRng, 1).unwrap();
        assert!(matches!(
            a.commit(&mut OsRng, 1),
            Err(CustodyError::NonceAlreadyPublished { .. })
        ));
        a.abort();
        assert!(a.commit(&mut OsRng, 1).is_ok());
    }

    #[test]
    fn missing_participant_blocks_round_two() {
        let g = group(3);
        let mut a = SigningSession::new(&g.keys[0], b"m");
        let mut round1 = Round1Nonces::new();
        round1.insert(a.signer(), a.commit(&mut OsRng, 1).unwrap());
        let err = a.sign(&g.aggregated, &round1).unwrap_err();
        assert!(matches!(err, CustodyError::MissingParticipantNonces { .. }));

        // The nonces survive a failed attempt; nothing secret was used.
        let mut b = SigningSession::new(&g.keys[1], b"m");
        let mut c = SigningSession::new(&g.keys[2], b"m");
        round1.insert(b.signer(), b.commit(&mut OsRng, 1).unwrap());
        round1.insert(c.signer(), c.commit(&mut OsRng, 1).unwrap());
        let partials = vec![
            a.sign(&g.aggregated, &round1).unwrap(),
            b.sign(&g.aggregated, &round1).unwrap(),
            c.sign(&g.aggregated, &round1).unwrap(),
        ];
        let sig = combine(&g.aggregated, &partials).unwrap();
        assert!(sig.verify(&g.aggregated.public_key(), b"m"));
    }

    #[test]
    fn combine_requires_every_partial() {
        let g = group(3);
        let (partials, _) = run(&g, b"m", 1);
        let err = combine(&g.aggregated, &partials[..2]).unwrap_err();
        assert!(matches!(err, CustodyError::MissingPartialSignature { .. }));

        let mut dup = partials.clone();
        dup.push(partials[0].clone());
        assert!(matches!(
            combine(&g.aggregated, &dup),
            Err(CustodyError::DuplicateParticipant { .. })
        ));
    }

    #[test]
    fn combine_rejects_mixed_challenges() {
        let g = group(2);
        let (mut partials, _) = run(&g, b"m", 1);
        partials[1].challenge += Scalar::ONE;
        assert!(matches!(
            combine(&g.aggregated, &partials),
            Err(CustodyError::ChallengeMismatch)
        ));
    }

    #[test]
    fn outsider_nonces_rejected() {
        let g = group(2);
        let outsider = KeyPair::generate(&mut OsRng);
        let mut round1 = Round1Nonces::new();
        let mut sessions: Vec<_> = g.keys.iter().map(|k| SigningSession::new(k, b"m")).collect();
        for s in &mut sessions {
            round1.insert(s.signer(), s.commit(&mut OsRng, 1).unwrap());
        }
        let mut o = SigningSession::new(&outsider, b"m");
        round1.insert(o.signer(), o.commit(&mut OsRng, 1).unwrap());
        assert!(matches!(
            aggregate_nonces(&g.aggregated, &round1, b"m"),
            Err(CustodyError::NotAParticipant { .. })
        ));
    }
}
