//! `flowindex index`: follow the node's `FlowUpdated` logs.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use flowindex_core::{EventFilter, FlowIndexConfig, StreamReconciler};
use flowindex_evm::{flow_updated_topic, IndexerBuilder, JsonRpcEvmClient};
use flowindex_rpc::{HttpTransport, RpcClient};

use crate::stores;

pub async fn run(
    config: FlowIndexConfig,
    from_block: Option<u64>,
    to_block: Option<u64>,
    reset: bool,
) -> Result<()> {
    let mut builder = IndexerBuilder::from_config(config.indexer.clone());
    let filter = &config.indexer.filter;
    if filter.addresses.is_empty() && filter.topic0_values.is_empty() {
        builder = match &config.cfa {
            Some(cfa) => builder.flow_agreement(cfa.clone()),
            None => {
                warn!("no agreement address configured; indexing FlowUpdated logs from any contract");
                builder.filter(EventFilter::default().topic0(flow_updated_topic()))
            }
        };
    }
    if let Some(block) = from_block {
        builder = builder.from_block(block);
    }
    if let Some(block) = to_block {
        builder = builder.to_block(block);
    }

    let transport = HttpTransport::default_for(config.rpc_url.clone())
        .with_context(|| format!("connect to {}", config.rpc_url))?;
    let client = JsonRpcEvmClient::new(RpcClient::new(Arc::new(transport)));

    let stores = stores::open(&config).await?;
    let reconciler = StreamReconciler::new(stores.streams.clone());
    let mut index = builder.build_reconciling(client, reconciler, stores.checkpoints);

    if reset {
        index.reset_checkpoint().await.context("reset checkpoint")?;
        info!("checkpoint cleared");
    }

    info!(rpc = %config.rpc_url, "indexing flows");
    tokio::select! {
        result = index.run() => result.context("index loop")?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    let stats = index.stats();
    println!(
        "blocks {}  events {}  rejected {}  last block {}  streams {}",
        stats.blocks,
        stats.events,
        stats.rejected,
        stats.last_block.map_or_else(|| "-".to_string(), |b| b.to_string()),
        stores.streams.stream_count().await?
    );
    Ok(())
}
