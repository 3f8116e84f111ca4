//! Checkpoint manager: persists the indexer's position for crash recovery.
//!
//! A checkpoint stores the last block whose `FlowUpdated` logs were fully
//! reconciled. On restart the index loop resumes right after it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FlowIndexError;

/// A persisted checkpoint for an indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Chain slug (e.g. `"local"`).
    pub chain_id: String,
    /// Unique indexer identifier.
    pub indexer_id: String,
    /// Last successfully processed block number.
    pub block_number: u64,
    /// Last successfully processed block hash (or a phase marker during backfill).
    pub block_hash: String,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the latest checkpoint for a given chain + indexer pair.
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, FlowIndexError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FlowIndexError>;

    /// Delete a checkpoint (e.g. when resetting an indexer).
    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), FlowIndexError>;
}

/// Manages checkpoint reads/writes for an indexer.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
    chain_id: String,
    indexer_id: String,
    /// How often to save (every N blocks).
    save_interval: u64,
    /// Block counter since last save.
    counter: u64,
}

impl CheckpointManager {
    pub fn new(
        store: Box<dyn CheckpointStore>,
        chain_id: impl Into<String>,
        indexer_id: impl Into<String>,
        save_interval: u64,
    ) -> Self {
        Self {
            store,
            chain_id: chain_id.into(),
            indexer_id: indexer_id.into(),
            save_interval: save_interval.max(1),
            counter: 0,
        }
    }

    /// Load the saved checkpoint (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<Checkpoint>, FlowIndexError> {
        self.store.load(&self.chain_id, &self.indexer_id).await
    }

    /// Record `blocks` more processed blocks and save once `save_interval`
    /// of them have accumulated.
    pub async fn maybe_save(
        &mut self,
        block_number: u64,
        block_hash: &str,
        blocks: u64,
    ) -> Result<(), FlowIndexError> {
        self.counter += blocks;
        if self.counter >= self.save_interval {
            self.force_save(block_number, block_hash).await?;
            self.counter = 0;
        }
        Ok(())
    }

    /// Immediately save a checkpoint (used on shutdown / end of backfill).
    pub async fn force_save(
        &self,
        block_number: u64,
        block_hash: &str,
    ) -> Result<(), FlowIndexError> {
        let cp = Checkpoint {
            chain_id: self.chain_id.clone(),
            indexer_id: self.indexer_id.clone(),
            block_number,
            block_hash: block_hash.to_string(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(cp).await
    }

    /// Forget the saved position.
    pub async fn reset(&self) -> Result<(), FlowIndexError> {
        self.store.delete(&self.chain_id, &self.indexer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<String, Checkpoint>>);

    #[async_trait]
    impl CheckpointStore for MapStore {
        async fn load(&self, c: &str, i: &str) -> Result<Option<Checkpoint>, FlowIndexError> {
            Ok(self.0.lock().unwrap().get(&format!("{c}:{i}")).cloned())
        }
        async fn save(&self, cp: Checkpoint) -> Result<(), FlowIndexError> {
            let key = format!("{}:{}", cp.chain_id, cp.indexer_id);
            self.0.lock().unwrap().insert(key, cp);
            Ok(())
        }
        async fn delete(&self, c: &str, i: &str) -> Result<(), FlowIndexError> {
            self.0.lock().unwrap().remove(&format!("{c}:{i}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn force_save_and_reset() {
        let mgr = CheckpointManager::new(Box::new(MapStore::default()), "local", "flows", 10);
        assert!(mgr.load().await.unwrap().is_none());

        mgr.force_save(1000, "0xabc").await.unwrap();
        let cp = mgr.load().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 1000);
        assert_eq!(cp.block_hash, "0xabc");
        assert_eq!(cp.chain_id, "local");

        mgr.reset().await.unwrap();
        assert!(mgr.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_save_interval() {
        let mut mgr = CheckpointManager::new(Box::new(MapStore::default()), "local", "idx", 5);

        for i in 1..=4 {
            mgr.maybe_save(i, "0xhash", 1).await.unwrap();
        }
        assert!(mgr.load().await.unwrap().is_none());

        mgr.maybe_save(5, "0xhash5", 1).await.unwrap();
        assert_eq!(mgr.load().await.unwrap().unwrap().block_number, 5);

        // a batch counts every block it covers
        mgr.maybe_save(105, "backfill", 100).await.unwrap();
        assert_eq!(mgr.load().await.unwrap().unwrap().block_number, 105);
    }
}
