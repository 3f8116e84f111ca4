//! Index loop configuration and state.

use serde::{Deserialize, Serialize};

use crate::types::EventFilter;

/// Configuration for one `FlowUpdated` index loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Checkpoint key.
    pub id: String,
    /// Chain slug (e.g. `"local"`).
    pub chain: String,
    /// First block to index.
    pub from_block: u64,
    /// Optional end block for a bounded backfill. `None` = follow the head forever.
    pub to_block: Option<u64>,
    /// Blocks behind the head that are still considered unsafe.
    /// A local development node needs none.
    pub confirmation_depth: u64,
    /// Blocks per `eth_getLogs` call.
    pub batch_size: u64,
    /// Save a checkpoint every N blocks.
    pub checkpoint_interval: u64,
    /// Head polling interval in live mode (milliseconds).
    pub poll_interval_ms: u64,
    /// Agreement address + `FlowUpdated` topic.
    pub filter: EventFilter,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "flows".into(),
            chain: "local".into(),
            from_block: 0,
            to_block: None,
            confirmation_depth: 0,
            batch_size: 1000,
            checkpoint_interval: 100,
            poll_interval_ms: 2000,
            filter: EventFilter::default(),
        }
    }
}

/// Runtime state of the index loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    Idle,
    /// Catching up to the confirmed head.
    Backfilling,
    /// Following the head.
    Live,
    Stopping,
    Stopped,
    /// Gave up after an unrecoverable error.
    Error,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Backfilling => "backfilling",
            Self::Live => "live",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: IndexerConfig =
            serde_json::from_str(r#"{"from_block": 42, "batch_size": 10}"#).unwrap();
        assert_eq!(cfg.from_block, 42);
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.id, "flows");
        assert_eq!(cfg.checkpoint_interval, 100);
    }

    #[test]
    fn state_display() {
        assert_eq!(IndexerState::Backfilling.to_string(), "backfilling");
        assert_eq!(IndexerState::Live.to_string(), "live");
    }
}
