//! Two counterparties keep independent copies of one session and must end
//! with identical session hashes after exchanging the same traffic.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use custody_codec::fixtures::{custody_codec, fill, quote, transfer};
use custody_session::*;
use custody_types::{CustodyError, SessionKey};

fn t(ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::milliseconds(ms)
}

#[test]
fn both_sides_agree_after_wire_exchange() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("custody_session=debug")
        .with_test_writer()
        .try_init();

    let codec = custody_codec();
    let key = SessionKey::new("ALICE", "BOB");
    let mut alice = Session::new(key.clone(), codec.clone());
    let mut bob = Session::new(key, codec.clone());

    let traffic = vec![
        quote("ALICE", "BOB", 1, &t(0)),
        quote("ALICE", "BOB", 2, &t(10)),
        fill("BOB", "ALICE", 1, &t(20)),
        transfer("ALICE", "BOB", 3, &t(30)),
        transfer("BOB", "ALICE", 2, &t(40)),
    ];

    for msg in traffic {
        // Each side sees the message after a trip over the wire.
        let wire = codec.encode(&msg).unwrap();
        alice.admit(codec.decode(&wire).unwrap()).unwrap();
        bob.admit(codec.decode(&wire).unwrap()).unwrap();
    }

    assert_eq!(alice.len(), 5);
    assert_eq!(alice.session_hash(), bob.session_hash());
}

#[test]
fn divergent_logs_have_different_hashes() {
    let codec = custody_codec();
    let key = SessionKey::new("ALICE", "BOB");
    let mut alice = Session::new(key.clone(), codec.clone());
    let mut bob = Session::new(key, codec);

    alice.admit(quote("ALICE", "BOB", 1, &t(0))).unwrap();
    bob.admit(quote("ALICE", "BOB", 1, &t(0))).unwrap();

    let mut altered = quote("ALICE", "BOB", 2, &t(1));
    alice.admit(altered.clone()).unwrap();
    altered.insert("BidPx", "1");
    bob.admit(altered).unwrap();

    assert_ne!(alice.session_hash(), bob.session_hash());
}

#[test]
fn sequence_scenario() {
    let mut s = Session::new(SessionKey::new("ALICE", "BOB"), custody_codec());
    for (i, seq) in [1, 2, 3].into_iter().enumerate() {
        s.admit(quote("ALICE", "BOB", seq, &t(i64::try_from(i).unwrap())))
            .unwrap();
    }
    assert!(matches!(
        s.admit(quote("ALICE", "BOB", 3, &t(100))),
        Err(CustodyError::SequenceViolation { .. })
    ));
    assert!(matches!(
        s.admit(quote("ALICE", "BOB", 5, &t(101))),
        Err(CustodyError::SequenceViolation { .. })
    ));
    assert!(matches!(
        s.admit(quote("ALICE", "BOB", 4, &t(2))),
        Err(CustodyError::NonMonotonicSendingTime { .. })
    ));
    s.admit(quote("ALICE", "BOB", 4, &t(102))).unwrap();
}

#[test]
fn registry_serializes_concurrent_senders() {
    let registry = Arc::new(SessionRegistry::new(custody_codec()));
    let base = t(0);

    // One thread per session; each session's traffic stays ordered.
    let handles: Vec<_> = ["BOB", "CAROL", "DAVE", "ERIN"]
        .into_iter()
        .map(|peer| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for seq in 1..=20u64 {
                    let at = base + Duration::milliseconds(i64::try_from(seq).unwrap());
                    registry.admit(quote("ALICE", peer, seq, &at)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(registry.len(), 4);
    for peer in ["BOB", "CAROL", "DAVE", "ERIN"] {
        assert_eq!(
            registry.session_len(&SessionKey::new("ALICE", peer)),
            Some(20)
        );
    }
}

#[test]
fn custom_check_chain() {
    struct OnlyQuotes;
    impl SessionCheck for OnlyQuotes {
        fn name(&self) -> &'static str {
            "only-quotes"
        }
        fn check(&self, message: &custody_codec::WireMessage) -> custody_types::Result<()> {
            if message.msg_type() == Some("S") {
                Ok(())
            } else {
                Err(CustodyError::WrongSession {
                    reason: "quote-only session".into(),
                })
            }
        }
        fn commit(&mut self, _: &custody_codec::WireMessage) {}
    }

    let mut checks = default_checks();
    checks.push(Box::new(OnlyQuotes));
    let mut s = Session::with_checks(SessionKey::new("ALICE", "BOB"), custody_codec(), checks);
    s.admit(quote("ALICE", "BOB", 1, &t(0))).unwrap();
    assert!(s.admit(fill("ALICE", "BOB", 2, &t(1))).is_err());
    // The sequence check did not commit the rejected fill.
    s.admit(quote("ALICE", "BOB", 2, &t(2))).unwrap();
}
