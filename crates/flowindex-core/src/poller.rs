//! Periodic re-query of the store for a dashboard.
//!
//! The poller owns no state of its own: every tick runs the query again and
//! publishes the full result on a watch channel. Readers only ever see
//! committed reconciler output.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entity::Stream;
use crate::error::FlowIndexError;
use crate::query::StreamQuery;
use crate::store::StreamStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct StreamPoller {
    store: Arc<dyn StreamStore>,
    query: StreamQuery,
    interval: Duration,
}

impl StreamPoller {
    pub fn new(store: Arc<dyn StreamStore>, query: StreamQuery) -> Self {
        Self {
            store,
            query,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the query once.
    pub async fn poll_once(&self) -> Result<Vec<Stream>, FlowIndexError> {
        self.store.streams(&self.query).await
    }

    /// Poll until every receiver is dropped. The first poll happens
    /// immediately; a failed poll is logged and the previous result stays
    /// published.
    pub fn spawn(self) -> (watch::Receiver<Vec<Stream>>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(Vec::new());
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tx.closed() => break,
                }
                match self.poll_once().await {
                    Ok(streams) => {
                        debug!(count = streams.len(), "streams refreshed");
                        if tx.send(streams).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "stream poll failed"),
                }
            }
        });
        (rx, handle)
    }
}
