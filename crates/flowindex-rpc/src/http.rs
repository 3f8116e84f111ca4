//! HTTP JSON-RPC transport backed by `reqwest`.
//!
//! One attempt per request: callers decide whether anything is worth
//! repeating.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            request_timeout,
        })
    }

    /// Transport with the default 30 s request timeout.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        debug!(method = %req.method, id = %req.id, url = %self.url, "rpc request");
        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        ms: self.request_timeout.as_millis() as u64,
                    }
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        // port 9 (discard) is closed on any sane test host
        let t = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = t
            .send(JsonRpcRequest::new(1, "eth_blockNumber", vec![]))
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
        assert_eq!(t.url(), "http://127.0.0.1:9");
    }
}
