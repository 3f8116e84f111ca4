//! Stream revision reconciler: turns each `FlowUpdated` event into the
//! current `Stream` / `StreamRevision` state.
//!
//! Per event, inside one store transaction:
//! 1. load the triple's revision cursor, or start one at revision 0;
//! 2. derive the stream id for the cursor's current revision;
//! 3. point `mostRecentStream` at it;
//! 4. create the stream (`CREATED`) or mark it `UPDATED` / `TERMINATED`;
//! 5. overwrite `flowRate` and `updatedAt`, then commit both records.
//!
//! Re-applying an identical event leaves the store as it was: a redelivered
//! creation event is recognised and skipped, any other event writes the
//! values already stored. The revision index
//! is never advanced here, so a stream re-opened after termination reuses the
//! terminated record.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::entity::{Stream, StreamRevision, StreamStatus};
use crate::error::FlowIndexError;
use crate::event::{FlowUpdated, RawFlowUpdated, FLOW_UPDATED};
use crate::handler::{DecodedEvent, EventHandler};
use crate::ids;
use crate::store::StreamStore;
use crate::types::IndexContext;

/// What a single event did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub stream_id: String,
    pub revision_id: String,
    pub status: StreamStatus,
    /// `true` if this event created the stream record.
    pub created: bool,
}

/// Applies flow events to a [`StreamStore`].
#[derive(Clone)]
pub struct StreamReconciler {
    store: Arc<dyn StreamStore>,
}

impl StreamReconciler {
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        Self { store }
    }

    /// The store this reconciler writes to.
    pub fn store(&self) -> &Arc<dyn StreamStore> {
        &self.store
    }

    /// Validate a wire event and apply it. Malformed events are rejected
    /// before the store is touched.
    pub async fn apply_raw(&self, raw: &RawFlowUpdated) -> Result<Reconciled, FlowIndexError> {
        let event = raw.validate().map_err(|e| {
            warn!(error = %e, "rejected flow event");
            e
        })?;
        self.apply(&event).await
    }

    /// Apply one validated event atomically.
    pub async fn apply(&self, event: &FlowUpdated) -> Result<Reconciled, FlowIndexError> {
        let mut tx = self.store.begin().await?;

        let revision_id = event.revision_id();
        let mut revision = tx
            .revision(&revision_id)
            .await?
            .unwrap_or_else(|| StreamRevision::initial(revision_id.clone()));

        let stream_id = ids::stream_id(
            &event.sender,
            &event.receiver,
            &event.token,
            revision.revision_index,
        );
        let existing = tx.stream(&stream_id).await?;
        if let Some(stream) = existing.as_ref().filter(|s| is_creation_replay(s, event)) {
            // dropping the transaction leaves the store untouched
            debug!(stream = %stream_id, tx = %event.transaction_id, "creation event already applied");
            return Ok(Reconciled {
                stream_id,
                revision_id,
                status: stream.status,
                created: false,
            });
        }

        revision.most_recent_stream = Some(stream_id.clone());
        tx.put_revision(&revision).await?;

        let (mut stream, created) = match existing {
            Some(mut existing) => {
                existing.status = StreamStatus::after_update(event.flow_rate);
                (existing, false)
            }
            None => (open_stream(stream_id.clone(), event), true),
        };
        stream.flow_rate = event.flow_rate;
        stream.updated_at = event.timestamp.max(stream.created_at);
        tx.put_stream(&stream).await?;

        tx.commit().await?;

        debug!(
            stream = %stream_id,
            status = %stream.status,
            flow_rate = %stream.flow_rate,
            created,
            "flow reconciled"
        );

        Ok(Reconciled {
            stream_id,
            revision_id,
            status: stream.status,
            created,
        })
    }
}

/// `stream` is still exactly what `event` created.
fn is_creation_replay(stream: &Stream, event: &FlowUpdated) -> bool {
    stream.status == StreamStatus::Created
        && stream.tx_hash == event.transaction_id
        && stream.created_at == event.timestamp
        && stream.flow_rate == event.flow_rate
}

fn open_stream(id: String, event: &FlowUpdated) -> Stream {
    Stream {
        id,
        sender: ids::address_hex(&event.sender),
        receiver: ids::address_hex(&event.receiver),
        token: ids::address_hex(&event.token),
        flow_rate: event.flow_rate,
        status: StreamStatus::Created,
        created_at: event.timestamp,
        updated_at: event.timestamp,
        tx_hash: event.transaction_id.clone(),
    }
}

#[async_trait]
impl EventHandler for StreamReconciler {
    async fn handle(&self, event: &DecodedEvent, ctx: &IndexContext) -> Result<(), FlowIndexError> {
        let flow = FlowUpdated::from_decoded(event, ctx)?;
        self.apply(&flow).await.map(|_| ())
    }

    fn schema_name(&self) -> &str {
        FLOW_UPDATED
    }
}
