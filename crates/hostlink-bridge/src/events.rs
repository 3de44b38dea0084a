//! Pushes update events to the UI layer.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use hostlink_core::UpdateOrchestrator;

use crate::models::EventPayload;

/// Receives event channel payloads.
pub trait EventSink: Send + Sync {
    fn emit(&self, channel: &str, payload: Value);
}

/// Forwards every orchestrator event to `sink` on `channel`.
///
/// Runs until the orchestrator and all its clones are dropped.
pub fn forward_updates(
    updater: &UpdateOrchestrator,
    sink: Arc<dyn EventSink>,
    channel: String,
) -> JoinHandle<()> {
    let mut events = updater.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_value(EventPayload::from(&event)) {
                    Ok(payload) => sink.emit(&channel, payload),
                    Err(e) => warn!(error = %e, "Failed to encode update event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event forwarder lagged; events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!(channel = %channel, "Update event stream closed");
                    break;
                }
            }
        }
    })
}

/// Collects payloads in memory.
#[derive(Debug, Default)]
pub struct BufferedSink {
    events: Mutex<Vec<(String, Value)>>,
}

impl BufferedSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes everything emitted so far.
    pub fn take(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for BufferedSink {
    fn emit(&self, channel: &str, payload: Value) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel.to_string(), payload));
    }
}
