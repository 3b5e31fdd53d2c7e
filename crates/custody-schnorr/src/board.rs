//! In-process round-1 barrier.
//!
//! Round 2 may only start once every participant's public nonces for the
//! *same* message are known. [`NonceBoard`] collects round-1 broadcasts keyed
//! by message digest and lets each party wait for the complete set, bounded
//! by a timeout.
//!
//! Each round carries an attempt number, handed back to publishers in a
//! [`RoundTicket`]. Expiry abandons the whole attempt: its nonces are removed
//! from the board, every other waiter fails with
//! [`CustodyError::RoundAbandoned`], and all parties restart with fresh nonce
//! sets under a new attempt. A round is dropped from the board once every
//! participant has collected it.

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use custody_types::{CustodyError, Hash32, Result, SignerConfig};
use dashmap::DashMap;
use rand::rngs::OsRng;
use tokio::sync::broadcast;

use crate::{
    aggregate::AggregatedKey,
    hash::keccak256,
    keys::PublicKey,
    nonce::PublicNonces,
    sign::{PartialSignature, Round1Nonces, SigningSession},
};

#[derive(Debug)]
struct Round {
    attempt: u64,
    nonces: Round1Nonces,
    collected: BTreeSet<PublicKey>,
}

/// A party's handle on the round it published into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTicket {
    id: Hash32,
    attempt: u64,
    signer: PublicKey,
}

impl RoundTicket {
    #[must_use]
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    #[must_use]
    pub fn signer(&self) -> PublicKey {
        self.signer
    }
}

enum Progress {
    Complete(Round1Nonces),
    Waiting(usize),
    Abandoned,
}

/// Shared board of round-1 nonce broadcasts.
#[derive(Debug, Clone)]
pub struct NonceBoard {
    rounds: Arc<DashMap<Hash32, Round>>,
    attempts: Arc<AtomicU64>,
    notify: broadcast::Sender<Hash32>,
}

impl NonceBoard {
    #[must_use]
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1024);
        Self {
            rounds: Arc::new(DashMap::new()),
            attempts: Arc::new(AtomicU64::new(0)),
            notify,
        }
    }

    fn round_id(message: &[u8]) -> Hash32 {
        Hash32(keccak256(&[message]))
    }

    /// Record `signer`'s round-1 nonces for `message`.
    ///
    /// # Errors
    /// [`CustodyError::NonceAlreadyPublished`] if the signer already published
    /// into the current attempt for this message.
    pub fn publish(
        &self,
        message: &[u8],
        signer: PublicKey,
        nonces: PublicNonces,
    ) -> Result<RoundTicket> {
        let id = Self::round_id(message);
        let attempt = {
            let mut round = self.rounds.entry(id).or_insert_with(|| Round {
                attempt: self.attempts.fetch_add(1, Ordering::Relaxed),
                nonces: Round1Nonces::new(),
                collected: BTreeSet::new(),
            });
            if round.nonces.contains_key(&signer) {
                return Err(CustodyError::NonceAlreadyPublished {
                    key_hex: signer.to_hex(),
                });
            }
            round.nonces.insert(signer, nonces);
            round.attempt
        };
        // No receivers is fine: nobody is waiting yet.
        let _ = self.notify.send(id);
        Ok(RoundTicket {
            id,
            attempt,
            signer,
        })
    }

    /// Number of participants that have published into the live round for `message`.
    #[must_use]
    pub fn received(&self, message: &[u8]) -> usize {
        self.rounds
            .get(&Self::round_id(message))
            .map_or(0, |round| round.nonces.len())
    }

    /// Forget every broadcast for `message`. Waiters fail with
    /// [`CustodyError::RoundAbandoned`].
    pub fn clear(&self, message: &[u8]) {
        let id = Self::round_id(message);
        if self.rounds.remove(&id).is_some() {
            let _ = self.notify.send(id);
        }
    }

    /// Abandon the attempt `ticket` belongs to. Returns `false` if that
    /// attempt is already gone (completed, cleared or abandoned by someone else).
    pub fn withdraw(&self, ticket: &RoundTicket) -> bool {
        let removed = self
            .rounds
            .remove_if(&ticket.id, |_, round| round.attempt == ticket.attempt)
            .is_some();
        if removed {
            tracing::debug!(
                signer = %ticket.signer,
                attempt = ticket.attempt,
                "Round-1 attempt abandoned"
            );
            let _ = self.notify.send(ticket.id);
        }
        removed
    }

    fn progress(&self, ticket: &RoundTicket, aggregated: &AggregatedKey) -> Progress {
        let (complete, everyone_collected) = {
            let Some(mut round) = self.rounds.get_mut(&ticket.id) else {
                return Progress::Abandoned;
            };
            if round.attempt != ticket.attempt {
                return Progress::Abandoned;
            }
            let received = aggregated
                .participants()
                .filter(|p| round.nonces.contains_key(p))
                .count();
            if received < aggregated.len() {
                return Progress::Waiting(received);
            }
            let complete: Round1Nonces = aggregated
                .participants()
                .filter_map(|p| round.nonces.get(p).map(|n| (*p, n.clone())))
                .collect();
            round.collected.insert(ticket.signer);
            let everyone = aggregated
                .participants()
                .all(|p| round.collected.contains(p));
            (complete, everyone)
        };
        if everyone_collected {
            self.rounds
                .remove_if(&ticket.id, |_, round| round.attempt == ticket.attempt);
        }
        Progress::Complete(complete)
    }

    /// Wait until every participant of `aggregated` has published into the
    /// attempt of `ticket`.
    ///
    /// # Errors
    /// - [`CustodyError::RoundTimeout`] once `timeout` elapses; the attempt is
    ///   withdrawn from the board
    /// - [`CustodyError::RoundAbandoned`] if another party abandoned the attempt
    pub async fn collect(
        &self,
        ticket: &RoundTicket,
        aggregated: &AggregatedKey,
        timeout: Duration,
    ) -> Result<Round1Nonces> {
        let mut rx = self.notify.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let received = match self.progress(ticket, aggregated) {
                Progress::Complete(round1) => return Ok(round1),
                Progress::Abandoned => return Err(CustodyError::RoundAbandoned),
                Progress::Waiting(received) => received,
            };

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    received,
                    expected = aggregated.len(),
                    timeout_ms,
                    attempt = ticket.attempt,
                    "Round-1 barrier timed out"
                );
                self.withdraw(ticket);
                return Err(CustodyError::RoundTimeout {
                    timeout_ms,
                    received,
                    expected: aggregated.len(),
                });
            }

            tokio::select! {
                _ = rx.recv() => {}
                () = tokio::time::sleep(remaining.min(Duration::from_millis(100))) => {}
            }
        }
    }
}

impl Default for NonceBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Run both rounds for one party through a [`NonceBoard`].
///
/// Any failure before round 2 (duplicate publish, timeout, abandoned round)
/// aborts the session, so the caller can restart it with fresh nonces.
pub async fn sign_with_board(
    session: &mut SigningSession<'_>,
    board: &NonceBoard,
    aggregated: &AggregatedKey,
    config: &SignerConfig,
) -> Result<PartialSignature> {
    let public = session.commit(&mut OsRng, config.nonces_per_party)?;
    let ticket = match board.publish(session.message(), session.signer(), public) {
        Ok(ticket) => ticket,
        Err(err) => {
            session.abort();
            return Err(err);
        }
    };

    match board.collect(&ticket, aggregated, config.round_timeout).await {
        Ok(round1) => session.sign(aggregated, &round1),
        Err(err) => {
            session.abort();
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyPair, NonceSet, aggregate_keys, combine, verify};

    fn parties(n: usize) -> (Vec<KeyPair>, Vec<PublicKey>, AggregatedKey) {
        let keys: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate(&mut OsRng)).collect();
        let pubs: Vec<_> = keys.iter().map(KeyPair::public_key).collect();
        let aggregated = aggregate_keys(&pubs).unwrap();
        (keys, pubs, aggregated)
    }

    fn config(timeout_ms: u64) -> SignerConfig {
        SignerConfig {
            nonces_per_party: 1,
            round_timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn collect_returns_once_complete() {
        let (_keys, pubs, aggregated) = parties(2);
        let board = NonceBoard::new();

        let n0 = NonceSet::generate(&mut OsRng, 1).unwrap();
        let ticket = board.publish(b"m", pubs[0], n0.public().clone()).unwrap();
        assert_eq!(board.received(b"m"), 1);

        let waiter = {
            let board = board.clone();
            let aggregated = aggregated.clone();
            tokio::spawn(async move {
                board
                    .collect(&ticket, &aggregated, Duration::from_secs(5))
                    .await
            })
        };

        let n1 = NonceSet::generate(&mut OsRng, 1).unwrap();
        let other = board.publish(b"m", pubs[1], n1.public().clone()).unwrap();
        assert_eq!(other.attempt(), ticket.attempt());

        let round1 = waiter.await.unwrap().unwrap();
        assert_eq!(round1.len(), 2);
        assert_eq!(round1.get(&pubs[1]), Some(n1.public()));
    }

    #[tokio::test]
    async fn timeout_withdraws_the_attempt() {
        let (_keys, pubs, aggregated) = parties(2);
        let board = NonceBoard::new();
        let n0 = NonceSet::generate(&mut OsRng, 1).unwrap();
        let ticket = board.publish(b"m", pubs[0], n0.public().clone()).unwrap();

        let err = board
            .collect(&ticket, &aggregated, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::RoundTimeout {
                received: 1,
                expected: 2,
                ..
            }
        ));
        assert_eq!(board.received(b"m"), 0);
        assert!(!board.withdraw(&ticket));

        // Fresh nonces go into a new attempt.
        let n0 = NonceSet::generate(&mut OsRng, 1).unwrap();
        let retry = board.publish(b"m", pubs[0], n0.public().clone()).unwrap();
        assert_ne!(retry.attempt(), ticket.attempt());
    }

    #[tokio::test]
    async fn stale_ticket_cannot_collect_a_newer_attempt() {
        let (_keys, pubs, aggregated) = parties(2);
        let board = NonceBoard::new();
        let old = board
            .publish(b"m", pubs[0], NonceSet::generate(&mut OsRng, 1).unwrap().public().clone())
            .unwrap();
        assert!(board.withdraw(&old));

        board
            .publish(b"m", pubs[0], NonceSet::generate(&mut OsRng, 1).unwrap().public().clone())
            .unwrap();
        board
            .publish(b"m", pubs[1], NonceSet::generate(&mut OsRng, 1).unwrap().public().clone())
            .unwrap();
        assert!(matches!(
            board.collect(&old, &aggregated, Duration::from_secs(1)).await,
            Err(CustodyError::RoundAbandoned)
        ));
        assert!(!board.withdraw(&old));
        assert_eq!(board.received(b"m"), 2);
    }

    #[tokio::test]
    async fn rounds_are_scoped_per_message() {
        let key = KeyPair::generate(&mut OsRng);
        let board = NonceBoard::new();
        let a = NonceSet::generate(&mut OsRng, 1).unwrap();
        let b = NonceSet::generate(&mut OsRng, 1).unwrap();
        board.publish(b"one", key.public_key(), a.public().clone()).unwrap();
        board.publish(b"two", key.public_key(), b.public().clone()).unwrap();
        assert!(matches!(
            board.publish(b"one", key.public_key(), b.public().clone()),
            Err(CustodyError::NonceAlreadyPublished { .. })
        ));
        board.clear(b"one");
        assert_eq!(board.received(b"one"), 0);
        assert_eq!(board.received(b"two"), 1);
    }

    #[tokio::test]
    async fn timeout_aborts_session_nonces() {
        let (keys, _pubs, aggregated) = parties(2);
        let board = NonceBoard::new();

        let mut session = SigningSession::new(&keys[0], b"m");
        let err = sign_with_board(&mut session, &board, &aggregated, &config(30))
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::RoundTimeout { .. }));
        // Session is back to fresh: signing now fails fast, committing again works.
        assert!(matches!(
            session.sign(&aggregated, &Round1Nonces::new()),
            Err(CustodyError::NoncesNotGenerated)
        ));
        assert!(session.commit(&mut OsRng, 1).is_ok());
    }

    #[tokio::test]
    async fn rejected_publish_aborts_session() {
        let (keys, pubs, aggregated) = parties(2);
        let board = NonceBoard::new();
        board
            .publish(b"m", pubs[0], NonceSet::generate(&mut OsRng, 1).unwrap().public().clone())
            .unwrap();

        let mut session = SigningSession::new(&keys[0], b"m");
        assert!(matches!(
            sign_with_board(&mut session, &board, &aggregated, &config(30)).await,
            Err(CustodyError::NonceAlreadyPublished { .. })
        ));
        assert!(session.commit(&mut OsRng, 1).is_ok());
    }

    #[tokio::test]
    async fn completed_round_leaves_the_board() {
        let (keys, _pubs, aggregated) = parties(2);
        let board = NonceBoard::new();
        let mut first = SigningSession::new(&keys[0], b"done");
        let mut second = SigningSession::new(&keys[1], b"done");
        let cfg_0 = config(5_000);
        let cfg_1 = config(5_000);
        let (a, b) = tokio::join!(
            sign_with_board(&mut first, &board, &aggregated, &cfg_0),
            sign_with_board(&mut second, &board, &aggregated, &cfg_1),
        );
        let signature = combine(&aggregated, &[a.unwrap(), b.unwrap()]).unwrap();
        assert!(verify(&signature, &aggregated.public_key(), b"done"));
        assert_eq!(board.received(b"done"), 0);
    }

    #[tokio::test]
    async fn restart_after_timeout_signs_the_same_message() {
        let (keys, _pubs, aggregated) = parties(2);
        let board = NonceBoard::new();

        // The first party shows up alone and gives up.
        let mut early = SigningSession::new(&keys[0], b"m");
        assert!(matches!(
            sign_with_board(&mut early, &board, &aggregated, &config(30)).await,
            Err(CustodyError::RoundTimeout { received: 1, expected: 2, .. })
        ));

        // Both restart on the same message, the first with the same session.
        let mut late = SigningSession::new(&keys[1], b"m");
        let cfg_0 = config(5_000);
        let cfg_1 = config(5_000);
        let (a, b) = tokio::join!(
            sign_with_board(&mut early, &board, &aggregated, &cfg_0),
            sign_with_board(&mut late, &board, &aggregated, &cfg_1),
        );
        let signature = combine(&aggregated, &[a.unwrap(), b.unwrap()]).unwrap();
        assert!(verify(&signature, &aggregated.public_key(), b"m"));
    }

    #[tokio::test]
    async fn waiter_learns_the_round_was_abandoned() {
        let (keys, _pubs, aggregated) = parties(3);
        let board = NonceBoard::new();

        // keys[0] waits patiently, keys[1] gives up first, keys[2] is absent.
        let mut patient = SigningSession::new(&keys[0], b"m");
        let mut hasty = SigningSession::new(&keys[1], b"m");
        let cfg_0 = config(5_000);
        let cfg_1 = config(50);
        let (p, h) = tokio::join!(
            sign_with_board(&mut patient, &board, &aggregated, &cfg_0),
            sign_with_board(&mut hasty, &board, &aggregated, &cfg_1),
        );
        assert!(matches!(h, Err(CustodyError::RoundTimeout { received: 2, expected: 3, .. })));
        assert!(matches!(p, Err(CustodyError::RoundAbandoned)));
        assert_eq!(board.received(b"m"), 0);

        let mut absent = SigningSession::new(&keys[2], b"m");
        let cfg_0 = config(5_000);
        let cfg_1 = config(5_000);
        let cfg_2 = config(5_000);
        let (a, b, c) = tokio::join!(
            sign_with_board(&mut patient, &board, &aggregated, &cfg_0),
            sign_with_board(&mut hasty, &board, &aggregated, &cfg_1),
            sign_with_board(&mut absent, &board, &aggregated, &cfg_2),
        );
        let signature = combine(&aggregated, &[a.unwrap(), b.unwrap(), c.unwrap()]).unwrap();
        assert!(verify(&signature, &aggregated.public_key(), b"m"));
    }
}
