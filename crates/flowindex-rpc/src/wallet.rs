//! Account access and transaction submission.
//!
//! [`JsonRpcWallet`] talks to a development node that manages its own
//! unlocked accounts (`eth_accounts` / `eth_sendTransaction`), the way a local
//! test chain on `http://localhost:8545` does.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::abi;
use crate::error::SubmissionError;
use crate::transport::{parse_quantity, RpcClient};

/// An unsigned transaction for the node to sign and send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: U256,
}

impl TransactionRequest {
    fn to_json(&self) -> Value {
        json!({
            "from": format!("{:#x}", self.from),
            "to": format!("{:#x}", self.to),
            "data": abi::to_hex(&self.data),
            "value": format!("{:#x}", self.value),
        })
    }
}

/// The subset of a transaction receipt the client acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    /// `true` when the transaction executed successfully.
    pub success: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl RawReceipt {
    fn into_receipt(self) -> Result<TxReceipt, SubmissionError> {
        let quantity = |v: Option<String>| -> Result<u64, SubmissionError> {
            v.as_deref()
                .map(parse_quantity)
                .transpose()
                .map(|q| q.unwrap_or(0))
                .map_err(SubmissionError::from)
        };
        // pre-Byzantium receipts have no status; treat them as successful
        let success = match self.status.as_deref() {
            Some(s) => parse_quantity(s).map_err(SubmissionError::from)? == 1,
            None => true,
        };
        Ok(TxReceipt {
            tx_hash: self.transaction_hash,
            block_number: quantity(self.block_number)?,
            gas_used: quantity(self.gas_used)?,
            success,
        })
    }
}

/// An account the wallet can sign for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signer {
    pub address: Address,
}

/// Source of signing accounts and sink for transactions.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts the wallet can sign for.
    async fn list_accounts(&self) -> Result<Vec<Address>, SubmissionError>;

    /// A signer for `account`; `Rejected` if the wallet does not hold it.
    async fn signer(&self, account: Address) -> Result<Signer, SubmissionError>;

    /// Sign and broadcast. Returns the transaction hash.
    async fn send_transaction(
        &self,
        signer: &Signer,
        tx: TransactionRequest,
    ) -> Result<String, SubmissionError>;

    /// Wait until `tx_hash` is mined. A mined but failed transaction is
    /// `Reverted`; no receipt before the deadline is `Timeout`.
    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<TxReceipt, SubmissionError>;
}

/// [`WalletProvider`] backed by the node's own accounts.
pub struct JsonRpcWallet {
    client: RpcClient,
    poll_interval: Duration,
    timeout: Duration,
}

impl JsonRpcWallet {
    pub fn new(client: RpcClient) -> Self {
        Self {
            client,
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn list_accounts(&self) -> Result<Vec<Address>, SubmissionError> {
        let accounts: Vec<String> = self.client.call("eth_accounts", vec![]).await?;
        accounts
            .iter()
            .map(|a| {
                a.parse::<Address>()
                    .map_err(|e| SubmissionError::Rpc(format!("node returned bad account '{a}': {e}")))
            })
            .collect()
    }

    async fn signer(&self, account: Address) -> Result<Signer, SubmissionError> {
        let accounts = self.list_accounts().await?;
        if accounts.contains(&account) {
            Ok(Signer { address: account })
        } else {
            Err(SubmissionError::Rejected(format!(
                "node holds no key for {account:#x}"
            )))
        }
    }

    async fn send_transaction(
        &self,
        signer: &Signer,
        mut tx: TransactionRequest,
    ) -> Result<String, SubmissionError> {
        tx.from = signer.address;
        let hash: String = self
            .client
            .call("eth_sendTransaction", vec![tx.to_json()])
            .await?;
        info!(tx = %hash, from = %format!("{:#x}", tx.from), "transaction sent");
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<TxReceipt, SubmissionError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let raw: Option<RawReceipt> = self
                .client
                .call("eth_getTransactionReceipt", vec![json!(tx_hash)])
                .await?;

            match raw {
                Some(raw) if raw.block_number.is_some() => {
                    let receipt = raw.into_receipt()?;
                    if !receipt.success {
                        warn!(tx = %tx_hash, block = receipt.block_number, "transaction reverted");
                        return Err(SubmissionError::Reverted(format!(
                            "{tx_hash} failed in block {}",
                            receipt.block_number
                        )));
                    }
                    debug!(tx = %tx_hash, block = receipt.block_number, "transaction confirmed");
                    return Ok(receipt);
                }
                _ => {}
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(SubmissionError::Timeout {
                    tx_hash: tx_hash.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use std::sync::Arc;

    const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";

    fn wallet(mock: &Arc<MockTransport>) -> JsonRpcWallet {
        JsonRpcWallet::new(RpcClient::new(mock.clone()))
            .poll_interval(Duration::from_millis(5))
            .timeout(Duration::from_millis(40))
    }

    #[tokio::test]
    async fn signer_requires_known_account() {
        let mock = Arc::new(MockTransport::new());
        mock.on("eth_accounts", json!([ACCOUNT]));
        let w = wallet(&mock);

        let known: Address = ACCOUNT.parse().unwrap();
        assert_eq!(w.signer(known).await.unwrap().address, known);

        let unknown = Address::repeat_byte(0x99);
        assert!(matches!(w.signer(unknown).await, Err(SubmissionError::Rejected(_))));
    }

    #[tokio::test]
    async fn confirmation_polls_until_mined() {
        let mock = Arc::new(MockTransport::new());
        mock.on("eth_getTransactionReceipt", Value::Null);
        mock.on(
            "eth_getTransactionReceipt",
            json!({"transactionHash": "0xab", "blockNumber": "0x10", "gasUsed": "0x5208", "status": "0x1"}),
        );
        let receipt = wallet(&mock).wait_for_confirmation("0xab").await.unwrap();
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.gas_used, 21_000);
        assert!(receipt.success);
        assert_eq!(mock.calls("eth_getTransactionReceipt"), 2);
    }

    #[tokio::test]
    async fn failed_status_is_reverted() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            "eth_getTransactionReceipt",
            json!({"transactionHash": "0xab", "blockNumber": "0x10", "status": "0x0"}),
        );
        let err = wallet(&mock).wait_for_confirmation("0xab").await.unwrap_err();
        assert!(matches!(err, SubmissionError::Reverted(_)));
    }

    #[tokio::test]
    async fn missing_receipt_times_out() {
        let mock = Arc::new(MockTransport::new());
        mock.on("eth_getTransactionReceipt", Value::Null);
        let err = wallet(&mock).wait_for_confirmation("0xab").await.unwrap_err();
        assert!(matches!(err, SubmissionError::Timeout { .. }));
    }
}
