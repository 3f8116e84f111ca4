//! `flowindex streams` and `flowindex watch`.

use anyhow::Result;

use flowindex_core::query::{StreamQuery, StreamType};
use flowindex_core::{FlowIndexConfig, Stream, StreamPoller, StreamRow, StreamStore, TokenRegistry};

use crate::stores;
use crate::StreamFilterArgs;

/// One account's dashboard query plus what is needed to render it.
pub struct StreamListing {
    account: String,
    query: StreamQuery,
    tokens: TokenRegistry,
}

impl StreamListing {
    pub fn new(config: &FlowIndexConfig, args: &StreamFilterArgs, skip: u32, first: Option<u32>) -> Self {
        let tokens = config.token_registry();
        let token = args.token.as_deref().map(|t| stores::resolve_token(&tokens, t));
        let query = StreamQuery::for_account(
            &args.account,
            args.stream_type,
            token.as_deref(),
            args.search.as_deref(),
        )
        .skip(skip)
        .first(first.unwrap_or(config.page_size));
        Self {
            account: args.account.trim().to_lowercase(),
            query,
            tokens,
        }
    }

    /// First page of every stream touching `account`.
    pub fn for_account(config: &FlowIndexConfig, account: &str) -> Self {
        let tokens = config.token_registry();
        Self {
            account: account.trim().to_lowercase(),
            query: StreamQuery::for_account(account, StreamType::All, None, None).first(config.page_size),
            tokens,
        }
    }

    pub async fn rows(&self, store: &dyn StreamStore) -> Result<Vec<StreamRow>> {
        let streams = store.streams(&self.query).await?;
        Ok(self.to_rows(&streams))
    }

    pub fn to_rows(&self, streams: &[Stream]) -> Vec<StreamRow> {
        streams
            .iter()
            .map(|s| StreamRow::from_stream(s, &self.account, &self.tokens))
            .collect()
    }
}

pub fn print_rows(rows: &[StreamRow]) {
    if rows.is_empty() {
        println!("no streams");
        return;
    }
    println!(
        "{:<9} {:<42} {:<30} {:<11} {:<11} STATE",
        "DIRECTION", "COUNTERPARTY", "MONTHLY", "CREATED", "UPDATED"
    );
    for row in rows {
        let counterparty = match row.direction {
            flowindex_core::Direction::Outgoing => &row.receiver,
            flowindex_core::Direction::Incoming => &row.sender,
        };
        let state = if row.terminated {
            "terminated"
        } else if row.actionable {
            "active (yours)"
        } else {
            "active"
        };
        println!(
            "{:<9} {:<42} {:<30} {:<11} {:<11} {}",
            row.direction, counterparty, row.monthly, row.created, row.updated, state
        );
    }
}

pub async fn list(
    config: &FlowIndexConfig,
    args: &StreamFilterArgs,
    skip: u32,
    first: Option<u32>,
    json: bool,
) -> Result<()> {
    let stores = stores::open(config).await?;
    let listing = StreamListing::new(config, args, skip, first);
    let rows = listing.rows(stores.streams.as_ref()).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_rows(&rows);
    }
    Ok(())
}

pub async fn watch(config: &FlowIndexConfig, args: &StreamFilterArgs, interval: Option<u64>) -> Result<()> {
    let stores = stores::open(config).await?;
    let listing = StreamListing::new(config, args, 0, None);
    let every = interval
        .map(|s| std::time::Duration::from_secs(s.max(1)))
        .unwrap_or_else(|| config.poll_interval());

    let (mut rx, handle) = StreamPoller::new(stores.streams.clone(), listing.query.clone())
        .interval(every)
        .spawn();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let streams = rx.borrow_and_update().clone();
                println!("--- {} streams ---", streams.len());
                print_rows(&listing.to_rows(&streams));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(rx);
    handle.abort();
    Ok(())
}
