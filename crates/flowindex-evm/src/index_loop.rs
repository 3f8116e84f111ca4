//! The main index loop: orchestrates backfill and live phases.
//!
//! # Phase 1: BACKFILL
//! Fetch logs from the resume point to `head - confirmation_depth` in
//! batches. For each batch: fetch logs → decode → dispatch → checkpoint.
//!
//! # Phase 2: LIVE
//! Every `poll_interval_ms`, read the head again and process the newly
//! confirmed blocks the same way.
//!
//! Logs are dispatched in `(block, log index)` order, so events of one
//! triple reach the reconciler in chain order. Malformed logs and events are
//! logged and skipped; any other error stops the loop without advancing the
//! checkpoint past the failed range.

use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

use flowindex_core::checkpoint::{Checkpoint, CheckpointManager, CheckpointStore};
use flowindex_core::error::FlowIndexError;
use flowindex_core::handler::{DecodedEvent, HandlerRegistry};
use flowindex_core::indexer::{IndexerConfig, IndexerState};
use flowindex_core::types::{BlockSummary, IndexContext, IndexPhase};

use crate::decode::decode_flow_updated;
use crate::fetcher::{EvmFetcher, EvmRpcClient};

/// Counters kept by the index loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Blocks scanned.
    pub blocks: u64,
    /// Events dispatched successfully.
    pub events: u64,
    /// Logs or events skipped as malformed.
    pub rejected: u64,
    pub last_block: Option<u64>,
}

pub struct IndexLoop<C: EvmRpcClient> {
    config: IndexerConfig,
    fetcher: EvmFetcher<C>,
    checkpoint: CheckpointManager,
    handlers: HandlerRegistry,
    state: IndexerState,
    next_block: u64,
    stats: IndexStats,
}

impl<C: EvmRpcClient> IndexLoop<C> {
    pub fn new(
        config: IndexerConfig,
        client: C,
        handlers: HandlerRegistry,
        checkpoints: Box<dyn CheckpointStore>,
    ) -> Self {
        let checkpoint = CheckpointManager::new(
            checkpoints,
            &config.chain,
            &config.id,
            config.checkpoint_interval,
        );
        Self {
            fetcher: EvmFetcher::new(client),
            checkpoint,
            handlers,
            state: IndexerState::Idle,
            next_block: config.from_block,
            stats: IndexStats::default(),
            config,
        }
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// The saved position, if any.
    pub async fn checkpoint(&self) -> Result<Option<Checkpoint>, FlowIndexError> {
        self.checkpoint.load().await
    }

    /// Forget the saved position; the next run starts at `from_block`.
    pub async fn reset_checkpoint(&self) -> Result<(), FlowIndexError> {
        self.checkpoint.reset().await
    }

    /// Run until `to_block` is reached (never, if unset) or an error occurs.
    pub async fn run(&mut self) -> Result<(), FlowIndexError> {
        let result = self.run_phases().await;
        if let Err(e) = &result {
            self.state = IndexerState::Error;
            error!(error = %e, next_block = self.next_block, "index loop stopped");
        }
        result
    }

    async fn run_phases(&mut self) -> Result<(), FlowIndexError> {
        if let Some(cp) = self.checkpoint.load().await? {
            let resume = cp.block_number.saturating_add(1);
            if resume > self.next_block {
                info!(
                    block = cp.block_number,
                    hash = %cp.block_hash,
                    "Resuming from checkpoint"
                );
                self.next_block = resume;
            }
        }

        // Phase 1: Backfill
        self.state = IndexerState::Backfilling;
        let head = self.fetcher.head_block_number().await?;
        let target = self.cap(head.saturating_sub(self.config.confirmation_depth));
        info!(from = self.next_block, target, head, "Starting backfill phase");

        self.backfill(target).await?;

        if self.reached_end() {
            self.state = IndexerState::Stopped;
            info!(stats = ?self.stats, "Bounded index complete");
            return Ok(());
        }

        // Phase 2: Live
        self.state = IndexerState::Live;
        self.live_loop().await
    }

    async fn backfill(&mut self, to: u64) -> Result<(), FlowIndexError> {
        let batch = self.config.batch_size.max(1);
        let mut last: Option<(u64, String)> = None;

        while self.next_block <= to {
            let current = self.next_block;
            let batch_end = current.saturating_add(batch - 1).min(to);
            let events = self.process_range(current, batch_end, IndexPhase::Backfill).await?;

            let hash = self.block_hash(batch_end).await?;
            self.checkpoint
                .maybe_save(batch_end, &hash, batch_end - current + 1)
                .await?;

            info!(current, batch_end, total = to, events, "Backfill batch complete");
            last = Some((batch_end, hash));
        }

        if let Some((at, hash)) = last {
            self.checkpoint.force_save(at, &hash).await?;
            info!(at, hash = %hash, "Backfill complete");
        }
        Ok(())
    }

    /// Hash of block `number`; empty when the node does not return the block.
    async fn block_hash(&self, number: u64) -> Result<String, FlowIndexError> {
        Ok(self
            .fetcher
            .block(number)
            .await?
            .map(|b| b.hash)
            .unwrap_or_default())
    }

    async fn live_loop(&mut self) -> Result<(), FlowIndexError> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let batch = self.config.batch_size.max(1);

        loop {
            tokio::time::sleep(poll_interval).await;

            let head = self.fetcher.head_block_number().await?;
            let confirmed = self.cap(head.saturating_sub(self.config.confirmation_depth));
            let next = self.next_block;
            if next > confirmed {
                continue;
            }
            let end = confirmed.min(next.saturating_add(batch - 1));

            let Some(end_block) = self.fetcher.block(end).await? else {
                continue;
            };

            self.process_range(next, end, IndexPhase::Live).await?;
            self.checkpoint
                .maybe_save(end, &end_block.hash, end - next + 1)
                .await?;

            if self.reached_end() {
                self.checkpoint.force_save(end, &end_block.hash).await?;
                self.state = IndexerState::Stopped;
                info!(stats = ?self.stats, "Reached end block");
                return Ok(());
            }
        }
    }

    /// Fetch, decode and dispatch every log in `[from, to]`. Returns the
    /// number of events dispatched.
    async fn process_range(
        &mut self,
        from: u64,
        to: u64,
        phase: IndexPhase,
    ) -> Result<u64, FlowIndexError> {
        let logs = self
            .fetcher
            .logs(from, to, &self.config.filter, self.config.batch_size)
            .await?;

        let mut events: Vec<DecodedEvent> = Vec::with_capacity(logs.len());
        for log in &logs {
            if log.is_removed() || !self.config.filter.matches_address(&log.address) {
                continue;
            }
            match decode_flow_updated(log) {
                Ok(event) => events.push(event),
                Err(e) if e.is_rejection() => {
                    warn!(tx = %log.tx_hash, error = %e, "skipping malformed log");
                    self.stats.rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }
        events.sort_by_key(|e| (e.block_number, e.log_index));

        let mut blocks: HashMap<u64, BlockSummary> = HashMap::new();
        let mut dispatched = 0;
        for event in &events {
            let block = match blocks.get(&event.block_number).cloned() {
                Some(b) => b,
                None => {
                    let b = self.fetcher.block(event.block_number).await?.ok_or_else(|| {
                        FlowIndexError::Rpc(format!("block {} not found", event.block_number))
                    })?;
                    blocks.insert(b.number, b.clone());
                    b
                }
            };
            let ctx = IndexContext {
                block,
                phase,
                chain: self.config.chain.clone(),
            };
            match self.handlers.dispatch_event(event, &ctx).await {
                Ok(()) => dispatched += 1,
                Err(e) if e.is_rejection() => {
                    warn!(tx = %event.tx_hash, error = %e, "skipping rejected event");
                    self.stats.rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.stats.events += dispatched;
        self.stats.blocks += to - from + 1;
        self.stats.last_block = Some(to);
        self.next_block = to.saturating_add(1);
        Ok(dispatched)
    }

    fn cap(&self, block: u64) -> u64 {
        self.config.to_block.map_or(block, |end| block.min(end))
    }

    fn reached_end(&self) -> bool {
        self.config.to_block.is_some_and(|end| self.next_block > end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexerBuilder;
    use crate::decode::tests::flow_log;
    use crate::fetcher::RawLog;
    use alloy_primitives::Address;
    use async_trait::async_trait;
    use flowindex_core::entity::StreamStatus;
    use flowindex_core::ids;
    use flowindex_core::memory::InMemoryStreamStore;
    use flowindex_core::reconciler::StreamReconciler;
    use flowindex_core::store::StreamStore;
    use flowindex_core::types::EventFilter;
    use flowindex_storage::InMemoryCheckpointStore;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Chain whose head advances through `heads` (the last one repeats) and
    /// whose block `n` has timestamp `1_700_000_000 + 100 * n`.
    struct FakeChain {
        heads: Mutex<VecDeque<u64>>,
        logs: Vec<RawLog>,
    }

    impl FakeChain {
        fn new(heads: &[u64], logs: Vec<RawLog>) -> Self {
            Self {
                heads: Mutex::new(heads.iter().copied().collect()),
                logs,
            }
        }
    }

    #[async_trait]
    impl EvmRpcClient for FakeChain {
        async fn get_block_number(&self) -> Result<u64, FlowIndexError> {
            let mut heads = self.heads.lock().unwrap();
            Ok(if heads.len() > 1 {
                heads.pop_front().unwrap()
            } else {
                heads[0]
            })
        }

        async fn get_block(&self, number: u64) -> Result<Option<BlockSummary>, FlowIndexError> {
            Ok(Some(BlockSummary {
                number,
                hash: format!("0x{number:064x}"),
                parent_hash: format!("0x{:064x}", number.saturating_sub(1)),
                timestamp: ts(number),
            }))
        }

        async fn get_logs(
            &self,
            from: u64,
            to: u64,
            filter: &EventFilter,
        ) -> Result<Vec<RawLog>, FlowIndexError> {
            Ok(self
                .logs
                .iter()
                .filter(|l| {
                    let n = l.block_number_u64().unwrap();
                    n >= from && n <= to && filter.matches_topic0(&l.topics[0])
                })
                .cloned()
                .collect())
        }
    }

    fn ts(block: u64) -> i64 {
        1_700_000_000 + 100 * block as i64
    }

    fn stream_id(sender: u8, receiver: u8) -> String {
        ids::stream_id(
            &Address::repeat_byte(sender),
            &Address::repeat_byte(receiver),
            &Address::repeat_byte(0x33),
            0,
        )
    }

    fn chain_logs() -> Vec<RawLog> {
        let mut truncated = flow_log(0x33, 0x11, 0x44, 5, 3, 1);
        truncated.topics.truncate(2);
        vec![
            // out of order on purpose: dispatch must sort by (block, index)
            flow_log(0x33, 0x11, 0x22, 200, 2, 0),
            flow_log(0x33, 0x11, 0x22, 100, 1, 4),
            flow_log(0x33, 0x11, 0x22, 0, 3, 0),
            truncated,
            flow_log(0x33, 0x22, 0x44, 50, 4, 0),
        ]
    }

    fn reconciling(
        store: &InMemoryStreamStore,
        chain: FakeChain,
        checkpoints: &InMemoryCheckpointStore,
        builder: IndexerBuilder,
    ) -> IndexLoop<FakeChain> {
        let reconciler = StreamReconciler::new(Arc::new(store.clone()));
        builder.build_reconciling(chain, reconciler, Box::new(checkpoints.clone()))
    }

    #[tokio::test]
    async fn bounded_backfill_reconciles_in_chain_order() {
        let store = InMemoryStreamStore::new();
        let checkpoints = InMemoryCheckpointStore::new();
        let builder = IndexerBuilder::new()
            .flow_agreement("0xcfa0000000000000000000000000000000000000")
            .to_block(3)
            .batch_size(2)
            .checkpoint_interval(1);
        let mut lp = reconciling(&store, FakeChain::new(&[10], chain_logs()), &checkpoints, builder);

        lp.run().await.unwrap();
        assert_eq!(lp.state(), IndexerState::Stopped);
        assert_eq!(
            lp.stats(),
            &IndexStats {
                blocks: 4,
                events: 3,
                rejected: 1,
                last_block: Some(3),
            }
        );

        let stream = store.stream(&stream_id(0x11, 0x22)).await.unwrap().unwrap();
        assert_eq!(stream.status, StreamStatus::Terminated);
        assert_eq!(stream.created_at, ts(1));
        assert_eq!(stream.updated_at, ts(3));
        // block 4 is past the end
        assert!(store.stream(&stream_id(0x22, 0x44)).await.unwrap().is_none());

        let cp = lp.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 3);
        assert_eq!(cp.block_hash, format!("0x{:064x}", 3));
    }

    #[tokio::test]
    async fn resumes_after_checkpoint() {
        let store = InMemoryStreamStore::new();
        let checkpoints = InMemoryCheckpointStore::new();

        let first = IndexerBuilder::new().to_block(2);
        let mut lp = reconciling(&store, FakeChain::new(&[10], chain_logs()), &checkpoints, first);
        lp.run().await.unwrap();
        assert_eq!(lp.stats().events, 2);

        let second = IndexerBuilder::new().to_block(4);
        let mut lp = reconciling(&store, FakeChain::new(&[10], chain_logs()), &checkpoints, second);
        lp.run().await.unwrap();
        // only blocks 3 and 4 are scanned again
        assert_eq!(lp.stats().blocks, 2);
        assert_eq!(lp.stats().events, 2);
        assert_eq!(store.stream_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn live_phase_follows_head() {
        let store = InMemoryStreamStore::new();
        let checkpoints = InMemoryCheckpointStore::new();
        let builder = IndexerBuilder::new()
            .from_block(1)
            .to_block(4)
            .confirmation_depth(1)
            .poll_interval_ms(5);
        // backfill sees head 2 (confirmed 1); live sees 3, then 5
        let chain = FakeChain::new(&[2, 3, 5], chain_logs());
        let mut lp = reconciling(&store, chain, &checkpoints, builder);

        lp.run().await.unwrap();
        assert_eq!(lp.state(), IndexerState::Stopped);
        assert_eq!(lp.stats().last_block, Some(4));
        let cp = lp.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 4);
        assert_eq!(cp.block_hash, format!("0x{:064x}", 4));

        let opened = store.stream(&stream_id(0x22, 0x44)).await.unwrap().unwrap();
        assert_eq!(opened.status, StreamStatus::Created);
        assert_eq!(opened.created_at, ts(4));
    }

    struct Unreachable;

    #[async_trait]
    impl EvmRpcClient for Unreachable {
        async fn get_block_number(&self) -> Result<u64, FlowIndexError> {
            Err(FlowIndexError::Rpc("connection refused".into()))
        }
        async fn get_block(&self, _: u64) -> Result<Option<BlockSummary>, FlowIndexError> {
            Ok(None)
        }
        async fn get_logs(&self, _: u64, _: u64, _: &EventFilter) -> Result<Vec<RawLog>, FlowIndexError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn node_failure_is_error_state() {
        let mut lp = IndexerBuilder::new().build(
            Unreachable,
            HandlerRegistry::new(),
            Box::new(InMemoryCheckpointStore::new()),
        );
        assert!(matches!(lp.run().await, Err(FlowIndexError::Rpc(_))));
        assert_eq!(lp.state(), IndexerState::Error);
    }
}
