//! flowindex-evm — follow a node's `FlowUpdated` logs into the stream store.

pub mod builder;
pub mod decode;
pub mod fetcher;
pub mod index_loop;

pub use builder::IndexerBuilder;
pub use decode::{decode_flow_updated, flow_updated_topic};
pub use fetcher::{EvmFetcher, EvmRpcClient, JsonRpcEvmClient, RawLog};
pub use index_loop::{IndexLoop, IndexStats};
