//! Event handler trait + registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::FlowIndexError;
use crate::types::IndexContext;

/// A decoded blockchain event (chain-agnostic representation).
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    /// The schema/event name (e.g. `"FlowUpdated"`).
    pub schema: String,
    /// Contract address that emitted the event.
    pub address: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Block number.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u32,
    /// Decoded fields as JSON.
    pub fields_json: serde_json::Value,
}

/// Trait for event handlers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called for each decoded event that matches the handler's schema.
    async fn handle(&self, event: &DecodedEvent, ctx: &IndexContext) -> Result<(), FlowIndexError>;

    /// The event schema name this handler processes (e.g. `"FlowUpdated"`).
    fn schema_name(&self) -> &str;
}

/// Registry of event handlers keyed by schema name.
pub struct HandlerRegistry {
    event_handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            event_handlers: HashMap::new(),
        }
    }

    /// Register an event handler for its schema name.
    pub fn on_event(&mut self, handler: Arc<dyn EventHandler>) {
        self.event_handlers
            .entry(handler.schema_name().to_string())
            .or_default()
            .push(handler);
    }

    /// Returns `true` if at least one handler is registered for `schema`.
    pub fn handles(&self, schema: &str) -> bool {
        self.event_handlers.contains_key(schema)
    }

    /// Dispatch an event to all matching handlers, in registration order.
    pub async fn dispatch_event(
        &self,
        event: &DecodedEvent,
        ctx: &IndexContext,
    ) -> Result<(), FlowIndexError> {
        if let Some(handlers) = self.event_handlers.get(&event.schema) {
            for handler in handlers {
                handler.handle(event, ctx).await?;
            }
        }
        Ok(())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
