//! EVM block and log fetcher.
//!
//! Uses JSON-RPC `eth_blockNumber`, `eth_getBlockByNumber` and `eth_getLogs`,
//! splitting long ranges so a node that caps log queries still answers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use flowindex_core::error::FlowIndexError;
use flowindex_core::types::{BlockSummary, EventFilter};
use flowindex_rpc::transport::{parse_quantity, RpcClient};

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: String,
    #[serde(rename = "transactionHash", default)]
    pub tx_hash: String,
    #[serde(rename = "logIndex", default)]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> Result<u64, FlowIndexError> {
        Ok(parse_quantity(&self.block_number)?)
    }

    pub fn log_index_u32(&self) -> Result<u32, FlowIndexError> {
        let index = parse_quantity(&self.log_index)?;
        u32::try_from(index).map_err(|_| FlowIndexError::Rpc(format!("log index {index} out of range")))
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Trait for fetching EVM data from a JSON-RPC provider.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    async fn get_block_number(&self) -> Result<u64, FlowIndexError>;
    async fn get_block(&self, number: u64) -> Result<Option<BlockSummary>, FlowIndexError>;
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &EventFilter,
    ) -> Result<Vec<RawLog>, FlowIndexError>;
}

// ─── JsonRpcEvmClient ────────────────────────────────────────────────────────

/// [`EvmRpcClient`] over any JSON-RPC transport.
#[derive(Clone)]
pub struct JsonRpcEvmClient {
    client: RpcClient,
}

impl JsonRpcEvmClient {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EvmRpcClient for JsonRpcEvmClient {
    async fn get_block_number(&self) -> Result<u64, FlowIndexError> {
        let head: String = self.client.call("eth_blockNumber", vec![]).await?;
        Ok(parse_quantity(&head)?)
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockSummary>, FlowIndexError> {
        let block: Option<Value> = self
            .client
            .call("eth_getBlockByNumber", vec![json!(format!("{number:#x}")), json!(false)])
            .await?;
        match block {
            None => Ok(None),
            Some(v) => block_from_json(&v)
                .map(Some)
                .ok_or_else(|| FlowIndexError::Rpc(format!("malformed block {number}"))),
        }
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &EventFilter,
    ) -> Result<Vec<RawLog>, FlowIndexError> {
        let logs: Vec<RawLog> = self
            .client
            .call("eth_getLogs", vec![log_filter_json(from, to, filter)])
            .await?;
        Ok(logs)
    }
}

/// The `eth_getLogs` filter object for `[from, to]`.
pub fn log_filter_json(from: u64, to: u64, filter: &EventFilter) -> Value {
    let mut params = json!({
        "fromBlock": format!("{from:#x}"),
        "toBlock": format!("{to:#x}"),
    });
    match filter.addresses.as_slice() {
        [] => {}
        [one] => params["address"] = json!(one),
        many => params["address"] = json!(many),
    }
    if !filter.topic0_values.is_empty() {
        params["topics"] = json!([filter.topic0_values]);
    }
    params
}

// ─── EvmFetcher ──────────────────────────────────────────────────────────────

/// Wraps an [`EvmRpcClient`] and adds range splitting.
pub struct EvmFetcher<C> {
    client: C,
}

impl<C: EvmRpcClient> EvmFetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Fetch the current chain head block number.
    pub async fn head_block_number(&self) -> Result<u64, FlowIndexError> {
        self.client.get_block_number().await
    }

    /// Fetch a block summary by number.
    pub async fn block(&self, number: u64) -> Result<Option<BlockSummary>, FlowIndexError> {
        self.client.get_block(number).await
    }

    /// Fetch all logs in `[from, to]` matching the filter, at most
    /// `max_range` blocks per request.
    pub async fn logs(
        &self,
        from: u64,
        to: u64,
        filter: &EventFilter,
        max_range: u64,
    ) -> Result<Vec<RawLog>, FlowIndexError> {
        if to < from {
            return Ok(vec![]);
        }
        let span = max_range.max(1);
        let mut all_logs = Vec::new();
        let mut start = from;
        while start <= to {
            let end = start.saturating_add(span - 1).min(to);
            all_logs.extend(self.client.get_logs(start, end, filter).await?);
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        Ok(all_logs)
    }
}

/// Convert a JSON block response to a [`BlockSummary`].
pub fn block_from_json(v: &Value) -> Option<BlockSummary> {
    let quantity = |key: &str| v[key].as_str().and_then(|s| parse_quantity(s).ok());
    Some(BlockSummary {
        number: quantity("number")?,
        hash: v["hash"].as_str()?.to_string(),
        parent_hash: v["parentHash"].as_str()?.to_string(),
        timestamp: i64::try_from(quantity("timestamp")?).ok()?,
    })
}
