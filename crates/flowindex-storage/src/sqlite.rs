//! SQLite storage backend for FlowIndex.
//!
//! Persists streams, revision cursors and indexer checkpoints to a single
//! SQLite file, in WAL mode. Writes are serialized: a transaction holds the
//! store's write lock from `begin` until commit or drop.
//!
//! # Usage
//! ```rust,no_run
//! use flowindex_storage::sqlite::SqliteStreamStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStreamStore::open("./flows.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStreamStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use flowindex_core::checkpoint::{Checkpoint, CheckpointStore};
use flowindex_core::entity::{FlowRate, Stream, StreamRevision, StreamStatus};
use flowindex_core::error::FlowIndexError;
use flowindex_core::query::StreamQuery;
use flowindex_core::store::{StoreTransaction, StreamStore};

fn storage_err(e: impl std::fmt::Display) -> FlowIndexError {
    FlowIndexError::Storage(e.to_string())
}

const STREAM_COLUMNS: &str =
    "id, sender, receiver, token, flow_rate, status, created_at, updated_at, tx_hash";

/// SQLite-backed stream and checkpoint storage. Clones share the pool.
#[derive(Clone)]
pub struct SqliteStreamStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteStreamStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./flows.db"`) or a full
    /// SQLite URL (`"sqlite:./flows.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, FlowIndexError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(storage_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(storage_err)?;
        Self::with_pool(pool).await
    }

    /// Open an in-memory SQLite database.
    ///
    /// Limited to one connection, since every new connection to `:memory:`
    /// would see its own empty database. All data is lost when the pool is
    /// dropped.
    pub async fn in_memory() -> Result<Self, FlowIndexError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, FlowIndexError> {
        let store = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), FlowIndexError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS streams (
                id         TEXT    PRIMARY KEY,
                sender     TEXT    NOT NULL,
                receiver   TEXT    NOT NULL,
                token      TEXT    NOT NULL,
                flow_rate  TEXT    NOT NULL,
                status     TEXT    NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                tx_hash    TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stream_revisions (
                id                    TEXT    PRIMARY KEY,
                revision_index        INTEGER NOT NULL,
                period_revision_index INTEGER NOT NULL,
                most_recent_stream    TEXT
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                chain_id     TEXT    NOT NULL,
                indexer_id   TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                block_hash   TEXT    NOT NULL,
                updated_at   INTEGER NOT NULL,
                PRIMARY KEY (chain_id, indexer_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_streams_sender ON streams (sender);",
            "CREATE INDEX IF NOT EXISTS idx_streams_receiver ON streams (receiver);",
            "CREATE INDEX IF NOT EXISTS idx_streams_created ON streams (created_at DESC, id);",
        ] {
            sqlx::query(index)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }

        Ok(())
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn stream_from_row(row: &SqliteRow) -> Result<Stream, FlowIndexError> {
    let flow_rate: String = row.try_get("flow_rate").map_err(storage_err)?;
    let status: String = row.try_get("status").map_err(storage_err)?;
    Ok(Stream {
        id: row.try_get("id").map_err(storage_err)?,
        sender: row.try_get("sender").map_err(storage_err)?,
        receiver: row.try_get("receiver").map_err(storage_err)?,
        token: row.try_get("token").map_err(storage_err)?,
        flow_rate: flow_rate.parse::<FlowRate>().map_err(storage_err)?,
        status: status.parse::<StreamStatus>().map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        updated_at: row.try_get("updated_at").map_err(storage_err)?,
        tx_hash: row.try_get("tx_hash").map_err(storage_err)?,
    })
}

fn revision_from_row(row: &SqliteRow) -> Result<StreamRevision, FlowIndexError> {
    Ok(StreamRevision {
        id: row.try_get("id").map_err(storage_err)?,
        revision_index: row.try_get::<i64, _>("revision_index").map_err(storage_err)? as u32,
        period_revision_index: row
            .try_get::<i64, _>("period_revision_index")
            .map_err(storage_err)? as u32,
        most_recent_stream: row.try_get("most_recent_stream").map_err(storage_err)?,
    })
}

// ─── Transactions ────────────────────────────────────────────────────────────

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
    _write: OwnedMutexGuard<()>,
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn revision(&mut self, id: &str) -> Result<Option<StreamRevision>, FlowIndexError> {
        let row = sqlx::query(
            "SELECT id, revision_index, period_revision_index, most_recent_stream
             FROM stream_revisions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(revision_from_row).transpose()
    }

    async fn stream(&mut self, id: &str) -> Result<Option<Stream>, FlowIndexError> {
        let row = sqlx::query(&format!("SELECT {STREAM_COLUMNS} FROM streams WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(stream_from_row).transpose()
    }

    async fn put_revision(&mut self, revision: &StreamRevision) -> Result<(), FlowIndexError> {
        sqlx::query(
            "INSERT OR REPLACE INTO stream_revisions
             (id, revision_index, period_revision_index, most_recent_stream)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&revision.id)
        .bind(revision.revision_index as i64)
        .bind(revision.period_revision_index as i64)
        .bind(&revision.most_recent_stream)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn put_stream(&mut self, stream: &Stream) -> Result<(), FlowIndexError> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO streams ({STREAM_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&stream.id)
        .bind(&stream.sender)
        .bind(&stream.receiver)
        .bind(&stream.token)
        .bind(stream.flow_rate.to_string())
        .bind(stream.status.as_str())
        .bind(stream.created_at)
        .bind(stream.updated_at)
        .bind(&stream.tx_hash)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), FlowIndexError> {
        let SqliteTransaction { tx, _write } = *self;
        tx.commit().await.map_err(storage_err)
    }
}

// ─── StreamStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl StreamStore for SqliteStreamStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, FlowIndexError> {
        let write = Arc::clone(&self.write_lock).lock_owned().await;
        let tx = self.pool.begin().await.map_err(storage_err)?;
        Ok(Box::new(SqliteTransaction { tx, _write: write }))
    }

    async fn stream(&self, id: &str) -> Result<Option<Stream>, FlowIndexError> {
        let row = sqlx::query(&format!("SELECT {STREAM_COLUMNS} FROM streams WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(stream_from_row).transpose()
    }

    async fn revision(&self, id: &str) -> Result<Option<StreamRevision>, FlowIndexError> {
        let row = sqlx::query(
            "SELECT id, revision_index, period_revision_index, most_recent_stream
             FROM stream_revisions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(revision_from_row).transpose()
    }

    async fn streams(&self, query: &StreamQuery) -> Result<Vec<Stream>, FlowIndexError> {
        let mut binds = Vec::new();
        let filter = query.filter.to_sql(&mut binds);
        let sql = format!(
            "SELECT {STREAM_COLUMNS} FROM streams WHERE {filter}
             ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query(&sql);
        for value in &binds {
            q = q.bind(value);
        }
        let rows = q
            .bind(query.first as i64)
            .bind(query.skip as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        debug!(rows = rows.len(), binds = binds.len(), "stream query");
        rows.iter().map(stream_from_row).collect()
    }

    async fn stream_count(&self) -> Result<u64, FlowIndexError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM streams")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStreamStore {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, FlowIndexError> {
        let row = sqlx::query(
            "SELECT chain_id, indexer_id, block_number, block_hash, updated_at
             FROM checkpoints WHERE chain_id = ? AND indexer_id = ?",
        )
        .bind(chain_id)
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| Checkpoint {
            chain_id: r.get("chain_id"),
            indexer_id: r.get("indexer_id"),
            block_number: r.get::<i64, _>("block_number") as u64,
            block_hash: r.get("block_hash"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FlowIndexError> {
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints
             (chain_id, indexer_id, block_number, block_hash, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.chain_id)
        .bind(&checkpoint.indexer_id)
        .bind(checkpoint.block_number as i64)
        .bind(&checkpoint.block_hash)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            chain_id = %checkpoint.chain_id,
            indexer_id = %checkpoint.indexer_id,
            block = checkpoint.block_number,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), FlowIndexError> {
        sqlx::query("DELETE FROM checkpoints WHERE chain_id = ? AND indexer_id = ?")
            .bind(chain_id)
            .bind(indexer_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
