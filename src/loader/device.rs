// src/loader/device.rs
//! Device loader: synchronous enumeration of on-device photo metadata,
//! filtered by bounds in batches with a cancellation check between batches.
//! The metadata store itself is an external collaborator (the platform's
//! media database); this loader only filters, caps and stamps records.

use std::sync::Arc;

use metrics::counter;
use sha2::{Digest, Sha256};

use crate::error::SourceLoadError;
use crate::types::{Bounds, PhotoRecord, SourceDescriptor};

use super::{LoadContext, SourceLoader};

/// Photos examined between two cancellation checks.
const BATCH_SIZE: usize = 256;

/// Read-only enumeration of device-resident photo metadata. Schema and
/// persistence are owned externally.
pub trait PhotoMetadataStore: Send + Sync {
    fn enumerate_photos(&self) -> Result<Vec<PhotoRecord>, SourceLoadError>;
}

/// Metadata store backed by a JSON database file (`{"photos": [...]}`), the
/// format the mobile app maintains on disk.
pub struct JsonFileStore {
    path: std::path::PathBuf,
}

#[derive(serde::Deserialize)]
struct PhotoDbFile {
    photos: Vec<PhotoRecord>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PhotoMetadataStore for JsonFileStore {
    fn enumerate_photos(&self) -> Result<Vec<PhotoRecord>, SourceLoadError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| SourceLoadError::Store(format!("{}: {e}", self.path.display())))?;
        let db: PhotoDbFile = serde_json::from_str(&content)
            .map_err(|e| SourceLoadError::Store(format!("{}: {e}", self.path.display())))?;
        Ok(db.photos)
    }
}

/// Store with nothing in it, for deployments without device media access.
pub struct EmptyStore;

impl PhotoMetadataStore for EmptyStore {
    fn enumerate_photos(&self) -> Result<Vec<PhotoRecord>, SourceLoadError> {
        Ok(Vec::new())
    }
}

pub struct DeviceLoader {
    store: Arc<dyn PhotoMetadataStore>,
}

impl DeviceLoader {
    pub fn new(store: Arc<dyn PhotoMetadataStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl SourceLoader for DeviceLoader {
    async fn load_photos(
        &self,
        source: &SourceDescriptor,
        bounds: Option<&Bounds>,
        limit: usize,
        ctx: &LoadContext,
    ) -> Result<Vec<PhotoRecord>, SourceLoadError> {
        let all = self.store.enumerate_photos()?;
        counter!("device_photos_enumerated_total").increment(all.len() as u64);

        let mut out = Vec::new();
        for batch in all.chunks(BATCH_SIZE) {
            // Partial results are returned immediately on abort; the
            // orchestrator discards them before emission anyway.
            if ctx.cancel.is_cancelled() {
                tracing::debug!(source = %source.id, loaded = out.len(), "device load aborted");
                return Ok(out);
            }
            for photo in batch {
                if out.len() >= limit {
                    return Ok(out);
                }
                if let Some(b) = bounds {
                    if !b.contains(&photo.coord) {
                        continue;
                    }
                }
                out.push(stamp(photo.clone(), source));
            }
        }
        Ok(out)
    }
}

/// Attribute the record to the requesting source and backfill a content hash
/// so grid dedup has an identity even when the store carries none.
fn stamp(mut photo: PhotoRecord, source: &SourceDescriptor) -> PhotoRecord {
    photo.source_id = source.id.clone();
    if photo.content_hash.is_none() {
        let digest = Sha256::digest(photo.content_ref.as_bytes());
        photo.content_hash = Some(hex::encode(digest));
    }
    photo
}
