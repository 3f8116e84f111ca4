//! In-memory stream store.
//!
//! A transaction holds the store lock from `begin` until it is committed or
//! dropped, and stages writes locally. All data is lost when the process
//! exits.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::entity::{Stream, StreamRevision};
use crate::error::FlowIndexError;
use crate::query::StreamQuery;
use crate::store::{StoreTransaction, StreamStore};

#[derive(Debug, Default)]
struct Tables {
    streams: HashMap<String, Stream>,
    revisions: HashMap<String, StreamRevision>,
}

/// Ordered copy of the whole store, for comparisons and dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSnapshot {
    pub streams: BTreeMap<String, Stream>,
    pub revisions: BTreeMap<String, StreamRevision>,
}

/// RAM-backed [`StreamStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryStreamStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every committed record, ordered by id.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.lock().await;
        StoreSnapshot {
            streams: tables.streams.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            revisions: tables.revisions.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

struct MemoryTransaction {
    tables: OwnedMutexGuard<Tables>,
    staged_streams: HashMap<String, Stream>,
    staged_revisions: HashMap<String, StreamRevision>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn revision(&mut self, id: &str) -> Result<Option<StreamRevision>, FlowIndexError> {
        Ok(self
            .staged_revisions
            .get(id)
            .or_else(|| self.tables.revisions.get(id))
            .cloned())
    }

    async fn stream(&mut self, id: &str) -> Result<Option<Stream>, FlowIndexError> {
        Ok(self
            .staged_streams
            .get(id)
            .or_else(|| self.tables.streams.get(id))
            .cloned())
    }

    async fn put_revision(&mut self, revision: &StreamRevision) -> Result<(), FlowIndexError> {
        self.staged_revisions.insert(revision.id.clone(), revision.clone());
        Ok(())
    }

    async fn put_stream(&mut self, stream: &Stream) -> Result<(), FlowIndexError> {
        self.staged_streams.insert(stream.id.clone(), stream.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), FlowIndexError> {
        let MemoryTransaction {
            mut tables,
            staged_streams,
            staged_revisions,
        } = *self;
        tables.revisions.extend(staged_revisions);
        tables.streams.extend(staged_streams);
        Ok(())
    }
}

#[async_trait]
impl StreamStore for InMemoryStreamStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, FlowIndexError> {
        let tables = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            tables,
            staged_streams: HashMap::new(),
            staged_revisions: HashMap::new(),
        }))
    }

    async fn stream(&self, id: &str) -> Result<Option<Stream>, FlowIndexError> {
        Ok(self.tables.lock().await.streams.get(id).cloned())
    }

    async fn revision(&self, id: &str) -> Result<Option<StreamRevision>, FlowIndexError> {
        Ok(self.tables.lock().await.revisions.get(id).cloned())
    }

    async fn streams(&self, query: &StreamQuery) -> Result<Vec<Stream>, FlowIndexError> {
        let tables = self.tables.lock().await;
        Ok(query.apply(tables.streams.values()))
    }

    async fn stream_count(&self) -> Result<u64, FlowIndexError> {
        Ok(self.tables.lock().await.streams.len() as u64)
    }
}
