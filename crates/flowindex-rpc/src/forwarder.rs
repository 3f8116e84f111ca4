//! Client for the flow forwarder contract.
//!
//! ```text
//! createFlow(address token, address sender, address receiver, int96 flowrate, bytes userData)
//! updateFlow(address token, address sender, address receiver, int96 flowrate, bytes userData)
//! deleteFlow(address token, address sender, address receiver, bytes userData)
//! ```
//!
//! Each call returns a [`PendingTransaction`]; success is only known after
//! [`PendingTransaction::confirm`].

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use flowindex_core::FlowRate;

use crate::abi;
use crate::error::SubmissionError;
use crate::transport::RpcClient;
use crate::wallet::{TransactionRequest, TxReceipt, WalletProvider};

pub const CREATE_FLOW: &str = "createFlow(address,address,address,int96,bytes)";
pub const UPDATE_FLOW: &str = "updateFlow(address,address,address,int96,bytes)";
pub const DELETE_FLOW: &str = "deleteFlow(address,address,address,bytes)";
pub const BALANCE_OF: &str = "balanceOf(address)";

/// A sent transaction whose outcome is not known yet.
#[must_use = "a flow change is not confirmed until `confirm` is awaited"]
pub struct PendingTransaction {
    tx_hash: String,
    wallet: Arc<dyn WalletProvider>,
}

impl PendingTransaction {
    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    /// Wait for the receipt.
    pub async fn confirm(self) -> Result<TxReceipt, SubmissionError> {
        self.wallet.wait_for_confirmation(&self.tx_hash).await
    }
}

pub struct FlowForwarder {
    address: Address,
    wallet: Arc<dyn WalletProvider>,
    client: RpcClient,
}

impl FlowForwarder {
    /// `client` serves read-only calls (`eth_call`); transactions go through
    /// `wallet`.
    pub fn new(address: Address, wallet: Arc<dyn WalletProvider>, client: RpcClient) -> Self {
        Self {
            address,
            wallet,
            client,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Open a stream at `flow_rate` (native units per second).
    pub async fn create_flow(
        &self,
        token: Address,
        sender: Address,
        receiver: Address,
        flow_rate: FlowRate,
        user_data: &[u8],
    ) -> Result<PendingTransaction, SubmissionError> {
        check_rate(flow_rate)?;
        check_parties(sender, receiver)?;
        let data = abi::encode_call(
            CREATE_FLOW,
            vec![
                DynSolValue::Address(token),
                DynSolValue::Address(sender),
                DynSolValue::Address(receiver),
                abi::int96(flow_rate)?,
                DynSolValue::Bytes(user_data.to_vec()),
            ],
        )?;
        self.submit("createFlow", sender, data).await
    }

    /// Change the rate of an existing stream.
    pub async fn update_flow(
        &self,
        token: Address,
        sender: Address,
        receiver: Address,
        flow_rate: FlowRate,
        user_data: &[u8],
    ) -> Result<PendingTransaction, SubmissionError> {
        check_rate(flow_rate)?;
        check_parties(sender, receiver)?;
        let data = abi::encode_call(
            UPDATE_FLOW,
            vec![
                DynSolValue::Address(token),
                DynSolValue::Address(sender),
                DynSolValue::Address(receiver),
                abi::int96(flow_rate)?,
                DynSolValue::Bytes(user_data.to_vec()),
            ],
        )?;
        self.submit("updateFlow", sender, data).await
    }

    /// Close a stream. Sent from `sender`.
    pub async fn delete_flow(
        &self,
        token: Address,
        sender: Address,
        receiver: Address,
        user_data: &[u8],
    ) -> Result<PendingTransaction, SubmissionError> {
        check_parties(sender, receiver)?;
        let data = abi::encode_call(
            DELETE_FLOW,
            vec![
                DynSolValue::Address(token),
                DynSolValue::Address(sender),
                DynSolValue::Address(receiver),
                DynSolValue::Bytes(user_data.to_vec()),
            ],
        )?;
        self.submit("deleteFlow", sender, data).await
    }

    /// ERC-20 `balanceOf(account)` on `token`, in the token's smallest unit.
    pub async fn balance_of(&self, token: Address, account: Address) -> Result<U256, SubmissionError> {
        let data = abi::encode_call(BALANCE_OF, vec![DynSolValue::Address(account)])?;
        let call = json!({
            "to": format!("{token:#x}"),
            "data": abi::to_hex(&data),
        });
        let raw: String = self.client.call("eth_call", vec![call, json!("latest")]).await?;
        let bytes = abi::from_hex(&raw)
            .map_err(|e| SubmissionError::Rpc(format!("balanceOf returned bad hex: {e}")))?;
        Ok(abi::decode_uint(&bytes)?)
    }

    async fn submit(
        &self,
        op: &'static str,
        from: Address,
        data: Vec<u8>,
    ) -> Result<PendingTransaction, SubmissionError> {
        let signer = self.wallet.signer(from).await?;
        let tx = TransactionRequest {
            from,
            to: self.address,
            data,
            value: U256::ZERO,
        };
        let tx_hash = self.wallet.send_transaction(&signer, tx).await?;
        info!(op, tx = %tx_hash, sender = %format!("{from:#x}"), "flow change submitted");
        Ok(PendingTransaction {
            tx_hash,
            wallet: Arc::clone(&self.wallet),
        })
    }
}

fn check_rate(rate: FlowRate) -> Result<(), SubmissionError> {
    if rate.value() <= 0 {
        return Err(SubmissionError::InvalidInput(
            "flow rate must be positive; use delete to stop a stream".into(),
        ));
    }
    if !rate.fits_int96() {
        return Err(SubmissionError::InvalidInput("flow rate does not fit in int96".into()));
    }
    Ok(())
}

fn check_parties(sender: Address, receiver: Address) -> Result<(), SubmissionError> {
    if sender == receiver {
        return Err(SubmissionError::InvalidInput("sender and receiver are the same".into()));
    }
    Ok(())
}
