//! `flowindex flow create|update|delete` and `flowindex balance`.

use alloy_primitives::Address;
use anyhow::{anyhow, bail, Context, Result};
use clap::Subcommand;
use std::sync::Arc;

use flowindex_core::units::format_token_amount;
use flowindex_core::{FlowIndexConfig, FlowRate};
use flowindex_rpc::{
    FlowForwarder, HttpTransport, JsonRpcWallet, PendingTransaction, RpcClient, WalletProvider,
};

use crate::stores;

#[derive(Subcommand)]
pub enum FlowAction {
    /// Open a stream
    Create {
        #[command(flatten)]
        target: FlowTarget,
        /// Tokens per month, e.g. 1.5
        #[arg(long)]
        monthly: String,
    },
    /// Change the rate of an open stream
    Update {
        #[command(flatten)]
        target: FlowTarget,
        #[arg(long)]
        monthly: String,
    },
    /// Close a stream
    Delete {
        #[command(flatten)]
        target: FlowTarget,
    },
}

#[derive(clap::Args)]
pub struct FlowTarget {
    /// Token symbol or address
    #[arg(long)]
    token: String,
    #[arg(long)]
    receiver: String,
    /// Defaults to the node's first account
    #[arg(long)]
    sender: Option<String>,
}

struct Session {
    wallet: Arc<JsonRpcWallet>,
    client: RpcClient,
    config: FlowIndexConfig,
}

impl Session {
    fn connect(config: &FlowIndexConfig) -> Result<Self> {
        let transport = HttpTransport::default_for(config.rpc_url.clone())
            .with_context(|| format!("connect to {}", config.rpc_url))?;
        let client = RpcClient::new(Arc::new(transport));
        let wallet = JsonRpcWallet::new(client.clone()).timeout(config.confirmation_timeout());
        Ok(Self {
            wallet: Arc::new(wallet),
            client,
            config: config.clone(),
        })
    }

    fn forwarder(&self) -> Result<FlowForwarder> {
        let address = self
            .config
            .forwarder
            .as_deref()
            .ok_or_else(|| anyhow!("no forwarder address configured (set `forwarder` or `contracts_file`)"))?;
        Ok(FlowForwarder::new(
            parse_address("forwarder", address)?,
            self.wallet.clone(),
            self.client.clone(),
        ))
    }

    fn token(&self, token: &str) -> Result<Address> {
        let resolved = stores::resolve_token(&self.config.token_registry(), token);
        parse_address("token", &resolved)
    }

    /// `account`, or the node's first account.
    async fn account(&self, account: Option<&str>) -> Result<Address> {
        match account {
            Some(a) => parse_address("account", a),
            None => self
                .wallet
                .list_accounts()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("the node exposes no accounts")),
        }
    }
}

fn parse_address(what: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse::<Address>()
        .with_context(|| format!("invalid {what} address '{value}'"))
}

fn monthly_rate(amount: &str) -> Result<FlowRate> {
    let rate = FlowRate::from_monthly(amount).with_context(|| format!("convert '{amount}'"))?;
    if rate.is_zero() {
        bail!("'{amount}' per month rounds to a zero flow rate; use `flow delete` to stop a stream");
    }
    Ok(rate)
}

pub async fn run(config: &FlowIndexConfig, action: FlowAction) -> Result<()> {
    let session = Session::connect(config)?;
    let forwarder = session.forwarder()?;

    let pending: PendingTransaction = match action {
        FlowAction::Create { target, monthly } => {
            let rate = monthly_rate(&monthly)?;
            let (token, sender, receiver) = resolve(&session, &target).await?;
            forwarder.create_flow(token, sender, receiver, rate, &[]).await?
        }
        FlowAction::Update { target, monthly } => {
            let rate = monthly_rate(&monthly)?;
            let (token, sender, receiver) = resolve(&session, &target).await?;
            forwarder.update_flow(token, sender, receiver, rate, &[]).await?
        }
        FlowAction::Delete { target } => {
            let (token, sender, receiver) = resolve(&session, &target).await?;
            forwarder.delete_flow(token, sender, receiver, &[]).await?
        }
    };

    println!("sent {}", pending.tx_hash());
    let receipt = pending.confirm().await?;
    println!("confirmed in block {} (gas {})", receipt.block_number, receipt.gas_used);
    Ok(())
}

async fn resolve(session: &Session, target: &FlowTarget) -> Result<(Address, Address, Address)> {
    Ok((
        session.token(&target.token)?,
        session.account(target.sender.as_deref()).await?,
        parse_address("receiver", &target.receiver)?,
    ))
}

pub async fn balance(config: &FlowIndexConfig, token: &str, account: Option<&str>) -> Result<()> {
    let session = Session::connect(config)?;
    let forwarder = session.forwarder()?;
    let token_address = session.token(token)?;
    let account = session.account(account).await?;

    let raw = forwarder.balance_of(token_address, account).await?;
    let symbol = config.token_registry().symbol(&format!("{token_address:#x}")).to_string();
    println!("{} {symbol}", format_token_amount(raw));
    Ok(())
}
