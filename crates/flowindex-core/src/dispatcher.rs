//! Sharded event dispatcher.
//!
//! Events are routed to a fixed worker by their revision id, so every event
//! for one (sender, receiver, token) triple is applied in arrival order while
//! unrelated triples proceed in parallel.

use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::FlowIndexError;
use crate::event::{FlowUpdated, RawFlowUpdated};
use crate::reconciler::StreamReconciler;

/// Counters reported when the dispatcher shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Events committed to the store.
    pub applied: u64,
    /// Events that failed validation and never reached a shard.
    pub rejected: u64,
    /// Events whose store transaction failed.
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    applied: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            applied: self.applied.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Fan-out of flow events over `N` single-consumer shard workers.
pub struct ShardedDispatcher {
    shards: Vec<mpsc::Sender<FlowUpdated>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl ShardedDispatcher {
    /// Start `shards` workers, each with a queue of `capacity` events.
    /// Both values are clamped to at least 1.
    pub fn spawn(reconciler: StreamReconciler, shards: usize, capacity: usize) -> Self {
        let shards = shards.max(1);
        let counters = Arc::new(Counters::default());
        let mut senders = Vec::with_capacity(shards);
        let mut workers = Vec::with_capacity(shards);

        for shard in 0..shards {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push(tx);
            workers.push(tokio::spawn(run_shard(
                shard,
                rx,
                reconciler.clone(),
                Arc::clone(&counters),
            )));
        }

        info!(shards, "flow dispatcher started");
        Self {
            shards: senders,
            workers,
            counters,
        }
    }

    /// Validate a wire event and queue it. A malformed event is counted as
    /// rejected and its error returned; it never reaches the store.
    pub async fn submit(&self, raw: &RawFlowUpdated) -> Result<(), FlowIndexError> {
        match raw.validate() {
            Ok(event) => self.submit_event(event).await,
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "rejected flow event");
                Err(e)
            }
        }
    }

    /// Queue a validated event on its triple's shard. Waits while that
    /// shard's queue is full.
    pub async fn submit_event(&self, event: FlowUpdated) -> Result<(), FlowIndexError> {
        let shard = shard_for(&event.revision_id(), self.shards.len());
        self.shards[shard]
            .send(event)
            .await
            .map_err(|_| FlowIndexError::Other(format!("shard {shard} is no longer running")))
    }

    /// Counters so far.
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Close every queue, wait for the workers to drain them and return the
    /// final counters.
    pub async fn shutdown(self) -> DispatchStats {
        let Self {
            shards,
            workers,
            counters,
        } = self;
        drop(shards);

        for (shard, result) in join_all(workers).await.into_iter().enumerate() {
            if let Err(e) = result {
                error!(shard, error = %e, "shard worker panicked");
            }
        }

        let stats = counters.snapshot();
        info!(
            applied = stats.applied,
            rejected = stats.rejected,
            failed = stats.failed,
            "flow dispatcher stopped"
        );
        stats
    }
}

async fn run_shard(
    shard: usize,
    mut rx: mpsc::Receiver<FlowUpdated>,
    reconciler: StreamReconciler,
    counters: Arc<Counters>,
) {
    while let Some(event) = rx.recv().await {
        match reconciler.apply(&event).await {
            Ok(_) => {
                counters.applied.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    shard,
                    tx = %event.transaction_id,
                    error = %e,
                    "flow event failed"
                );
            }
        }
    }
}

/// Shard index for a revision id (`0x<64 hex>-<token>`). Uses the leading
/// 64 bits of the hash; ids without a hex prefix fall back to a byte sum.
pub fn shard_for(revision_id: &str, shards: usize) -> usize {
    let shards = shards.max(1) as u64;
    let hex = revision_id.strip_prefix("0x").unwrap_or(revision_id);
    let key = hex
        .get(..16)
        .and_then(|h| u64::from_str_radix(h, 16).ok())
        .unwrap_or_else(|| revision_id.bytes().map(u64::from).sum());
    (key % shards) as usize
}
