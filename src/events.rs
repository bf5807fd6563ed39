// src/events.rs
// Terminal events and the sink they leave through. The orchestrator emits at
// most one event per process; aborted processes emit nothing.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::types::PhotoRecord;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerEvent {
    #[serde(rename_all = "camelCase")]
    PhotosUpdate {
        process_id: String,
        photos_in_area: Vec<PhotoRecord>,
        photos_in_range: Vec<PhotoRecord>,
        /// source id -> number of photos it contributed to `photos_in_area`.
        source_breakdown: BTreeMap<String, usize>,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        process_id: String,
        message: String,
        timestamp: i64,
    },
}

impl WorkerEvent {
    pub fn process_id(&self) -> &str {
        match self {
            WorkerEvent::PhotosUpdate { process_id, .. } => process_id,
            WorkerEvent::Error { process_id, .. } => process_id,
        }
    }

    pub fn set_process_id(&mut self, id: &str) {
        match self {
            WorkerEvent::PhotosUpdate { process_id, .. } => *process_id = id.to_string(),
            WorkerEvent::Error { process_id, .. } => *process_id = id.to_string(),
        }
    }
}

/// Outward channel of the orchestrator. Fire-and-forget: a sink that cannot
/// accept the event drops it.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkerEvent);
}

/// Sink backed by an unbounded channel; the receiving half belongs to the
/// embedding frontend (or a test).
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: WorkerEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event sink receiver dropped; event discarded");
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
