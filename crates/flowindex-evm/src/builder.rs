//! Fluent builder API for `FlowUpdated` indexers.
//!
//! # Example
//!
//! ```rust,no_run
//! use flowindex_evm::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .id("flows")
//!     .flow_agreement("0xcfA132E353cB4E398080B9700609bb008eceB125")
//!     .from_block(0)
//!     .batch_size(500)
//!     .build_config();
//! ```

use std::sync::Arc;

use flowindex_core::checkpoint::CheckpointStore;
use flowindex_core::handler::HandlerRegistry;
use flowindex_core::indexer::IndexerConfig;
use flowindex_core::reconciler::StreamReconciler;
use flowindex_core::types::EventFilter;

use crate::decode::flow_updated_topic;
use crate::fetcher::EvmRpcClient;
use crate::index_loop::IndexLoop;

/// Fluent builder for `IndexerConfig` and [`IndexLoop`].
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. loaded from a file).
    pub fn from_config(config: IndexerConfig) -> Self {
        Self { config }
    }

    /// Set the indexer ID (used for checkpoint keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    pub fn from_block(mut self, block: u64) -> Self {
        self.config.from_block = block;
        self
    }

    /// Set the end block (for bounded backfill).
    pub fn to_block(mut self, block: u64) -> Self {
        self.config.to_block = Some(block);
        self
    }

    /// Blocks behind head before processing.
    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.config.confirmation_depth = depth;
        self
    }

    /// Blocks per `eth_getLogs` batch.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Save a checkpoint every N blocks.
    pub fn checkpoint_interval(mut self, n: u64) -> Self {
        self.config.checkpoint_interval = n;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn filter(mut self, filter: EventFilter) -> Self {
        self.config.filter = filter;
        self
    }

    /// Only `FlowUpdated` logs emitted by the agreement at `address`.
    pub fn flow_agreement(self, address: impl Into<String>) -> Self {
        self.filter(EventFilter::address(address).topic0(flow_updated_topic()))
    }

    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Build a loop dispatching to `handlers`.
    pub fn build<C: EvmRpcClient>(
        self,
        client: C,
        handlers: HandlerRegistry,
        checkpoints: Box<dyn CheckpointStore>,
    ) -> IndexLoop<C> {
        IndexLoop::new(self.config, client, handlers, checkpoints)
    }

    /// Build a loop that feeds every `FlowUpdated` event to `reconciler`.
    pub fn build_reconciling<C: EvmRpcClient>(
        self,
        client: C,
        reconciler: StreamReconciler,
        checkpoints: Box<dyn CheckpointStore>,
    ) -> IndexLoop<C> {
        let mut handlers = HandlerRegistry::new();
        handlers.on_event(Arc::new(reconciler));
        self.build(client, handlers, checkpoints)
    }
}
