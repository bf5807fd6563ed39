// src/loader/mod.rs
// Source loader abstraction: one trait, one method, dispatched through a
// kind-keyed lookup table so a third source kind is a table entry, not a
// change to photo operations.

pub mod device;
pub mod stream;

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::AuthTokenProvider;
use crate::cancel::CancelToken;
use crate::error::SourceLoadError;
use crate::types::{Bounds, PhotoRecord, SourceDescriptor, SourceKind};

pub use device::{DeviceLoader, PhotoMetadataStore};
pub use stream::StreamLoader;

/// Per-load context shared by every loader invocation of one process.
#[derive(Clone)]
pub struct LoadContext {
    pub cancel: CancelToken,
    pub auth: Arc<dyn AuthTokenProvider>,
}

#[async_trait::async_trait]
pub trait SourceLoader: Send + Sync {
    /// Load up to `limit` photos for `source`, filtered by `bounds` when
    /// given. Honors `ctx.cancel` cooperatively: a cancelled load returns the
    /// partial result gathered so far.
    async fn load_photos(
        &self,
        source: &SourceDescriptor,
        bounds: Option<&Bounds>,
        limit: usize,
        ctx: &LoadContext,
    ) -> Result<Vec<PhotoRecord>, SourceLoadError>;
}

pub struct LoaderRegistry {
    table: HashMap<SourceKind, Arc<dyn SourceLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self { table: HashMap::new() }
    }

    /// Registry with the two standard loaders.
    pub fn standard(store: Arc<dyn PhotoMetadataStore>) -> Self {
        let mut registry = Self::new();
        registry.register(SourceKind::Device, Arc::new(DeviceLoader::new(store)));
        registry.register(SourceKind::Stream, Arc::new(StreamLoader::from_http()));
        registry
    }

    pub fn register(&mut self, kind: SourceKind, loader: Arc<dyn SourceLoader>) {
        self.table.insert(kind, loader);
    }

    pub fn get(&self, kind: SourceKind) -> Result<&Arc<dyn SourceLoader>, SourceLoadError> {
        self.table.get(&kind).ok_or(SourceLoadError::UnknownKind(kind))
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
