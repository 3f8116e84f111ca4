//! In-memory checkpoint storage.
//!
//! Useful for replays and short-lived indexers that restart from block zero.
//! Clones share the same checkpoints.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use flowindex_core::checkpoint::{Checkpoint, CheckpointStore};
use flowindex_core::error::FlowIndexError;

#[derive(Default, Clone)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<Mutex<HashMap<String, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(chain_id: &str, indexer_id: &str) -> String {
    format!("{chain_id}:{indexer_id}")
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, FlowIndexError> {
        Ok(self.checkpoints.lock().await.get(&key(chain_id, indexer_id)).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FlowIndexError> {
        let k = key(&checkpoint.chain_id, &checkpoint.indexer_id);
        self.checkpoints.lock().await.insert(k, checkpoint);
        Ok(())
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), FlowIndexError> {
        self.checkpoints.lock().await.remove(&key(chain_id, indexer_id));
        Ok(())
    }
}
