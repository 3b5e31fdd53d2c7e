//! In-process content store.
//!
//! Hash = hex SHA-256 of the value's canonical JSON. `serde_json::Value`
//! keeps object keys sorted, so two structurally equal values always
//! serialize to the same bytes.

use custody_types::{ContentHash, CustodyError, Result};
use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};

use crate::contract::{ContentStore, StoredRecord, async_trait};

/// Content hash of a JSON value.
pub fn content_hash(value: &serde_json::Value) -> Result<ContentHash> {
    let canonical = serde_json::to_vec(value)?;
    Ok(ContentHash(hex::encode(Sha256::digest(&canonical))))
}

/// Store any serializable record.
pub async fn store_typed<T: Serialize + Sync>(
    store: &dyn ContentStore,
    record: &T,
) -> Result<ContentHash> {
    let value = serde_json::to_value(record)?;
    store.store(&value).await
}

/// Fetch and deserialize a record.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn ContentStore,
    hash: &ContentHash,
) -> Result<Option<(T, u64)>> {
    let Some(stored) = store.get(hash).await? else {
        return Ok(None);
    };
    let record = serde_json::from_value(stored.data)
        .map_err(|e| CustodyError::Store(format!("{hash} does not decode: {e}")))?;
    Ok(Some((record, stored.timestamp)))
}

/// [`ContentStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    records: DashMap<ContentHash, StoredRecord>,
}

impl MemoryContentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop a record (simulates an unavailable payload).
    pub fn evict(&self, hash: &ContentHash) -> Option<StoredRecord> {
        self.records.remove(hash).map(|(_, record)| record)
    }
}

pub(crate) fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn store(&self, value: &serde_json::Value) -> Result<ContentHash> {
        let hash = content_hash(value)?;
        self.records
            .entry(hash.clone())
            .or_insert_with(|| StoredRecord {
                data: value.clone(),
                timestamp: unix_now(),
            });
        tracing::debug!(hash = %hash, "Stored content record");
        Ok(hash)
    }

    async fn get(&self, hash: &ContentHash) -> Result<Option<StoredRecord>> {
        Ok(self.records.get(hash).map(|r| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_types::{BatchNumber, BatchRecord, Hash32, SettlementId};
    use serde_json::json;

    #[test]
    fn hash_ignores_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":[1,2]}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":[1,2],"a":1}"#).unwrap();
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
        assert_ne!(
            content_hash(&a).unwrap(),
            content_hash(&json!({"a": 2, "b": [1, 2]})).unwrap()
        );
        assert_eq!(content_hash(&a).unwrap().as_str().len(), 64);
    }

    #[tokio::test]
    async fn store_is_idempotent() {
        let store = MemoryContentStore::new();
        let value = json!({"x": 1});
        let h1 = store.store(&value).await.unwrap();
        let first = store.get(&h1).await.unwrap().unwrap();
        let h2 = store.store(&value).await.unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&h2).await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let store = MemoryContentStore::new();
        let record = BatchRecord {
            timestamp: 1_700_000_000,
            merkle_root: Hash32([7; 32]),
            settlements: vec![SettlementId(3)],
            batch: BatchNumber(2),
            batch_metadata_settlement_id: SettlementId(3),
        };
        let hash = store_typed(&store, &record).await.unwrap();
        let (back, _) = get_typed::<BatchRecord>(&store, &hash).await.unwrap().unwrap();
        assert_eq!(back, record);

        let missing = ContentHash("00".repeat(32));
        assert!(get_typed::<BatchRecord>(&store, &missing).await.unwrap().is_none());
    }
}
