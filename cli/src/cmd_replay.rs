//! `flowindex replay`: feed a JSON-lines file through the sharded dispatcher.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

use flowindex_core::{FlowIndexConfig, RawFlowUpdated, ShardedDispatcher, StreamReconciler};

use crate::cmd_streams;
use crate::stores;

pub async fn run(
    config: &FlowIndexConfig,
    file: &Path,
    shards: usize,
    capacity: usize,
    account: Option<&str>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("read events file '{}'", file.display()))?;

    let stores = stores::open(config).await?;
    let dispatcher =
        ShardedDispatcher::spawn(StreamReconciler::new(stores.streams.clone()), shards, capacity);

    let mut unparsable = 0u64;
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw: RawFlowUpdated = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping unparsable line");
                unparsable += 1;
                continue;
            }
        };
        if let Err(e) = dispatcher.submit(&raw).await {
            if !e.is_rejection() {
                return Err(e).with_context(|| format!("dispatch line {}", n + 1));
            }
        }
    }

    let stats = dispatcher.shutdown().await;
    println!(
        "applied {}  rejected {}  failed {}  streams {}",
        stats.applied,
        stats.rejected + unparsable,
        stats.failed,
        stores.streams.stream_count().await?
    );

    if let Some(account) = account {
        let filter = cmd_streams::StreamListing::for_account(config, account);
        cmd_streams::print_rows(&filter.rows(stores.streams.as_ref()).await?);
    }
    Ok(())
}
