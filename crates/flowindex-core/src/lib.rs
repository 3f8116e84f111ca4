//! flowindex-core — stream state for money-streaming protocols.
//!
//! # Architecture
//!
//! ```text
//! FlowUpdated (EVM log / JSON line)
//!     └── ShardedDispatcher   (per-triple FIFO shards)
//!             └── StreamReconciler (revision cursor + stream, one transaction)
//!                     └── StreamStore   (memory / SQLite)
//!                             └── StreamQuery / StreamPoller → StreamRow
//! ```

pub mod checkpoint;
pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod event;
pub mod handler;
pub mod ids;
pub mod indexer;
pub mod memory;
pub mod poller;
pub mod query;
pub mod reconciler;
pub mod store;
pub mod types;
pub mod units;
pub mod view;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore};
pub use config::FlowIndexConfig;
pub use dispatcher::{DispatchStats, ShardedDispatcher};
pub use entity::{FlowRate, Stream, StreamRevision, StreamStatus};
pub use error::{ConversionError, FlowIndexError};
pub use event::{FlowUpdated, RawFlowUpdated, FLOW_UPDATED, FLOW_UPDATED_SIGNATURE};
pub use handler::{DecodedEvent, EventHandler, HandlerRegistry};
pub use indexer::{IndexerConfig, IndexerState};
pub use memory::InMemoryStreamStore;
pub use poller::StreamPoller;
pub use query::{Field, Predicate, StreamQuery, StreamType};
pub use reconciler::{Reconciled, StreamReconciler};
pub use store::{StoreTransaction, StreamStore};
pub use types::{BlockSummary, EventFilter, IndexContext, IndexPhase};
pub use units::{to_monthly_rate, to_native_rate_per_second};
pub use view::{ContractAddresses, Direction, StreamRow, TokenInfo, TokenRegistry};
