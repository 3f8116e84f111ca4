//! Scripted in-process transport for tests and offline demos.
//!
//! Each method has a queue of canned replies. Replies are consumed in order
//! and the last one repeats, so a single `on` call answers forever.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::error::TransportError;
use crate::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
use crate::transport::RpcTransport;

type Reply = Result<Value, JsonRpcError>;

#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<JsonRpcRequest>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful result for `method`.
    pub fn on(&self, method: &str, result: Value) {
        lock(&self.replies)
            .entry(method.to_string())
            .or_default()
            .push_back(Ok(result));
    }

    /// Queue a node error for `method`.
    pub fn on_error(&self, method: &str, code: i64, message: &str) {
        lock(&self.replies)
            .entry(method.to_string())
            .or_default()
            .push_back(Err(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }));
    }

    /// How many times `method` was called.
    pub fn calls(&self, method: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<JsonRpcRequest> {
        lock(&self.requests).clone()
    }

    /// Id of the `n`-th request.
    pub fn request_id(&self, n: usize) -> Option<RpcId> {
        lock(&self.requests).get(n).map(|r| r.id.clone())
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let reply = {
            let mut replies = lock(&self.replies);
            match replies.get_mut(&req.method) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        let reply = reply.unwrap_or_else(|| {
            Err(JsonRpcError {
                code: -32601,
                message: format!("method {} not scripted", req.method),
                data: None,
            })
        });

        let id = req.id.clone();
        lock(&self.requests).push(req);

        Ok(match reply {
            Ok(result) => JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id,
                result: None,
                error: Some(error),
            },
        })
    }

    fn url(&self) -> &str {
        "mock://"
    }
}
