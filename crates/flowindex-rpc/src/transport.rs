//! The `RpcTransport` trait and a typed client on top of it.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Anything that can carry a JSON-RPC request to a node.
///
/// Object-safe; stored as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// The transport's identifier (URL or name).
    fn url(&self) -> &str;
}

/// Typed calls over a shared transport, with request ids assigned in order.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Call `method` and deserialize its result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .transport
            .send(JsonRpcRequest::new(id, method, params))
            .await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        serde_json::from_value(result).map_err(TransportError::Deserialization)
    }
}

/// Parse a `0x`-prefixed hex quantity (`"0x1b4"`).
pub fn parse_quantity(value: &str) -> Result<u64, TransportError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| TransportError::Other(format!("bad hex quantity '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Echo(Mutex<Vec<JsonRpcRequest>>);

    #[async_trait]
    impl RpcTransport for Echo {
        async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
            let id = match req.id {
                crate::request::RpcId::Number(n) => n,
                _ => 0,
            };
            let result = Value::String(req.method.clone());
            self.0.lock().unwrap().push(req);
            Ok(JsonRpcResponse::ok(id, result))
        }

        fn url(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn ids_increase_per_call() {
        let echo = Arc::new(Echo(Mutex::new(Vec::new())));
        let client = RpcClient::new(echo.clone());

        let a: String = client.call("eth_chainId", vec![]).await.unwrap();
        let _: String = client.call("eth_blockNumber", vec![]).await.unwrap();
        assert_eq!(a, "eth_chainId");

        let seen = echo.0.lock().unwrap();
        assert_eq!(seen[0].id, crate::request::RpcId::Number(1));
        assert_eq!(seen[1].id, crate::request::RpcId::Number(2));
    }

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }
}
