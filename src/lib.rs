// src/lib.rs
// Public library surface for integration tests (and embedding frontends).

pub mod auth;
pub mod cancel;
pub mod config;
pub mod cull;
pub mod envelope;
pub mod error;
pub mod events;
pub mod loader;
pub mod ops;
pub mod orchestrator;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::cancel::CancelToken;
pub use crate::envelope::{parse_request, RangeQuery, WorkerRequest};
pub use crate::events::{ChannelSink, EventSink, WorkerEvent};
pub use crate::loader::{LoaderRegistry, PhotoMetadataStore, SourceLoader};
pub use crate::ops::PhotoOps;
pub use crate::orchestrator::{Orchestrator, OrchestratorConfig};
pub use crate::types::{Bounds, GeoPoint, PhotoRecord, SourceDescriptor, SourceKind};
