//! Forwarded stream events.

use crate::error::ApplyResult;
use crate::handler::{HandlerCore, blocking};
use crate::host::EventHost;
use haforward_transport::WorkerPool;
use serde_json::Value;
use std::sync::Arc;

pub struct EventHandler {
    core: HandlerCore,
    events: Arc<dyn EventHost>,
    pool: WorkerPool,
}

impl EventHandler {
    pub fn new(events: Arc<dyn EventHost>, pool: WorkerPool) -> Self {
        Self {
            core: HandlerCore::new("stream event"),
            events,
            pool,
        }
    }

    /// Re-dispatches `event` to local listeners.
    pub async fn dispatch(&self, event: Value) -> ApplyResult<()> {
        // Identical payloads dedup on their serialized form.
        let id = event.to_string();
        let events = Arc::clone(&self.events);
        self.core
            .apply(&self.pool, &id, async move {
                blocking(move || Ok(events.dispatch(&event)?)).await
            })
            .await
    }
}
