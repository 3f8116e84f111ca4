//! Storage traits for stream state.
//!
//! Writes go through a [`StoreTransaction`]: the reconciler loads and stages
//! both records for one event, then commits them together. Dropping a
//! transaction without calling [`StoreTransaction::commit`] discards every
//! staged write.

use async_trait::async_trait;

use crate::entity::{Stream, StreamRevision};
use crate::error::FlowIndexError;
use crate::query::StreamQuery;

/// One atomic unit of work against a [`StreamStore`].
#[async_trait]
pub trait StoreTransaction: Send {
    /// Load a revision cursor, seeing writes staged earlier in this transaction.
    async fn revision(&mut self, id: &str) -> Result<Option<StreamRevision>, FlowIndexError>;

    /// Load a stream, seeing writes staged earlier in this transaction.
    async fn stream(&mut self, id: &str) -> Result<Option<Stream>, FlowIndexError>;

    /// Stage an upsert of a revision cursor.
    async fn put_revision(&mut self, revision: &StreamRevision) -> Result<(), FlowIndexError>;

    /// Stage an upsert of a stream.
    async fn put_stream(&mut self, stream: &Stream) -> Result<(), FlowIndexError>;

    /// Make every staged write visible at once.
    async fn commit(self: Box<Self>) -> Result<(), FlowIndexError>;
}

/// Persistent home of `Stream` and `StreamRevision` records.
///
/// Implementations: [`InMemoryStreamStore`](crate::memory::InMemoryStreamStore)
/// here, `SqliteStreamStore` in `flowindex-storage`.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, FlowIndexError>;

    /// Committed stream by id.
    async fn stream(&self, id: &str) -> Result<Option<Stream>, FlowIndexError>;

    /// Committed revision cursor by id.
    async fn revision(&self, id: &str) -> Result<Option<StreamRevision>, FlowIndexError>;

    /// Filtered, ordered, paginated listing.
    async fn streams(&self, query: &StreamQuery) -> Result<Vec<Stream>, FlowIndexError>;

    /// Total number of stream records.
    async fn stream_count(&self) -> Result<u64, FlowIndexError>;
}
