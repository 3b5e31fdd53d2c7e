//! Batch records stored by one validator must let any other validator
//! rebuild the committed tree and prove each settlement against its root.

use std::sync::Arc;

use custody_consensus::*;
use custody_types::{BatchNumber, BatchRecord, ContentHash, SettlementId};

fn record(ids: &[u64], metadata: u64) -> BatchRecord {
    let settlements: Vec<SettlementId> = ids.iter().copied().map(SettlementId).collect();
    BatchRecord {
        timestamp: 1_717_243_200,
        merkle_root: MerkleTree::from_settlements(&settlements).root(),
        settlements,
        batch: BatchNumber(7),
        batch_metadata_settlement_id: SettlementId(metadata),
    }
}

#[tokio::test]
async fn stored_record_proves_every_settlement() {
    let store: Arc<dyn ContentStore> = Arc::new(MemoryContentStore::new());
    let original = record(&[3, 5, 8, 13, 21], 13);
    let hash = store_typed(store.as_ref(), &original).await.unwrap();

    let (fetched, stored_at) = get_typed::<BatchRecord>(store.as_ref(), &hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched, original);
    assert!(stored_at > 0);

    let tree = MerkleTree::from_settlements(&fetched.settlements);
    assert_eq!(tree.root(), fetched.merkle_root);
    for (index, id) in fetched.settlements.iter().enumerate() {
        let proof = tree.proof(index).unwrap();
        assert_eq!(proof.leaf, leaf_hash(*id));
        assert!(proof.verify(&fetched.merkle_root));
    }
}

#[tokio::test]
async fn record_hash_is_stable_across_stores() {
    let a = MemoryContentStore::new();
    let b = MemoryContentStore::new();
    let r = record(&[1, 2], 2);
    let ha = store_typed(&a, &r).await.unwrap();
    let hb = store_typed(&b, &r).await.unwrap();
    assert_eq!(ha, hb);
    assert_eq!(ha, content_hash(&serde_json::to_value(&r).unwrap()).unwrap());

    let other = store_typed(&a, &record(&[1, 2], 1)).await.unwrap();
    assert_ne!(ha, other);
    assert_eq!(a.len(), 2);
}

#[tokio::test]
async fn undecodable_record_is_a_store_error() {
    let store = MemoryContentStore::new();
    let hash = store
        .store(&serde_json::json!({ "merkleRoot": 12 }))
        .await
        .unwrap();
    let err = get_typed::<BatchRecord>(&store, &hash).await.unwrap_err();
    assert!(err.to_string().starts_with("CR_ERR_405"));

    let absent = ContentHash("ff".repeat(32));
    assert!(store.get(&absent).await.unwrap().is_none());
}

#[test]
fn proof_serializes_as_hex_hashes() {
    let tree = MerkleTree::from_settlements(&[SettlementId(1), SettlementId(2)]);
    let proof = tree.proof(1).unwrap();
    let json = serde_json::to_value(&proof).unwrap();
    assert!(json["leaf"].as_str().unwrap().starts_with("0x"));
    let back: MerkleProof = serde_json::from_value(json).unwrap();
    assert_eq!(back, proof);
    assert!(back.verify(&tree.root()));
}
