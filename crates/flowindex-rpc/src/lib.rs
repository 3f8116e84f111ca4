//! flowindex-rpc — talking to the node.
//!
//! - [`transport`] / [`http`]: JSON-RPC over any [`RpcTransport`], `reqwest`
//!   for HTTP
//! - [`wallet`]: node-managed accounts, sending and confirming transactions
//! - [`forwarder`]: create / update / delete flows, token balances
//! - [`abi`]: type-checked call encoding over `alloy-dyn-abi`

pub mod abi;
pub mod error;
pub mod forwarder;
pub mod http;
pub mod mock;
pub mod request;
pub mod transport;
pub mod wallet;

pub use error::{SubmissionError, TransportError};
pub use forwarder::{FlowForwarder, PendingTransaction};
pub use http::HttpTransport;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use transport::{RpcClient, RpcTransport};
pub use wallet::{JsonRpcWallet, Signer, TransactionRequest, TxReceipt, WalletProvider};
