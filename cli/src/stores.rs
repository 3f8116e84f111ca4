//! Store selection: SQLite when a database is configured, RAM otherwise.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use flowindex_core::{CheckpointStore, FlowIndexConfig, StreamStore, TokenRegistry};
use flowindex_storage::{InMemoryCheckpointStore, InMemoryStreamStore, SqliteStreamStore};

pub struct Stores {
    pub streams: Arc<dyn StreamStore>,
    pub checkpoints: Box<dyn CheckpointStore>,
}

pub async fn open(config: &FlowIndexConfig) -> Result<Stores> {
    match &config.database_url {
        Some(url) => {
            let db = SqliteStreamStore::open(url)
                .await
                .with_context(|| format!("open database '{url}'"))?;
            info!(database = %url, "using SQLite store");
            Ok(Stores {
                streams: Arc::new(db.clone()),
                checkpoints: Box::new(db),
            })
        }
        None => {
            info!("using in-memory store; nothing is kept after exit");
            Ok(Stores {
                streams: Arc::new(InMemoryStreamStore::new()),
                checkpoints: Box::new(InMemoryCheckpointStore::new()),
            })
        }
    }
}

/// Accept a token symbol from the registry or a raw address.
pub fn resolve_token(tokens: &TokenRegistry, token: &str) -> String {
    tokens
        .by_symbol(token)
        .map(|t| t.address.to_lowercase())
        .unwrap_or_else(|| token.trim().to_lowercase())
}
