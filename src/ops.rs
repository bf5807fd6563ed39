// src/ops.rs
//! Photo operations: per-request fan-out over enabled sources, per-source
//! caching with containment-based reuse, and per-source failure containment.
//! A source that fails to load is logged and contributes zero photos; it
//! never aborts its siblings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::counter;

use crate::cancel::CancelToken;
use crate::loader::{LoadContext, LoaderRegistry};
use crate::types::{Bounds, PhotoRecord, SourceDescriptor};

#[derive(Debug, Clone)]
struct CacheEntry {
    photos: Vec<PhotoRecord>,
    complete: bool,
    /// `None` means the cached load was unbounded (covers any requested
    /// bounds); `Some` covers exactly that rectangle.
    cached_bounds: Option<Bounds>,
}

impl CacheEntry {
    fn covers(&self, requested: &Bounds) -> bool {
        if !self.complete {
            return false;
        }
        match &self.cached_bounds {
            None => true,
            Some(cached) => requested.is_within(cached),
        }
    }
}

pub struct PhotoOps {
    registry: LoaderRegistry,
    auth: Arc<dyn crate::auth::AuthTokenProvider>,
    /// One lock serializes cache mutation; loads themselves run outside it.
    cache: Mutex<HashMap<String, CacheEntry>>,
    config_version: AtomicU64,
    max_photos_in_area: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("config version mismatch: expected {expected}, current {current}")]
pub struct ConfigVersionMismatch {
    pub expected: u64,
    pub current: u64,
}

impl PhotoOps {
    pub fn new(
        registry: LoaderRegistry,
        auth: Arc<dyn crate::auth::AuthTokenProvider>,
        max_photos_in_area: usize,
    ) -> Self {
        Self {
            registry,
            auth,
            cache: Mutex::new(HashMap::new()),
            config_version: AtomicU64::new(0),
            max_photos_in_area,
        }
    }

    pub fn config_version(&self) -> u64 {
        self.config_version.load(Ordering::SeqCst)
    }

    /// Full (unbounded) load of every enabled source, repopulating the cache.
    /// Stale cache entries for sources that are gone or disabled are evicted
    /// before loading. Result order is immaterial; downstream culling
    /// re-sorts by priority.
    pub async fn process_config(
        &self,
        sources: &[SourceDescriptor],
        expected_version: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<Vec<PhotoRecord>, ConfigVersionMismatch> {
        if let Some(expected) = expected_version {
            let current = self.config_version();
            if expected != current {
                return Err(ConfigVersionMismatch { expected, current });
            }
        }

        self.evict_stale(sources);
        let ctx = LoadContext { cancel: cancel.clone(), auth: self.auth.clone() };

        let mut all = Vec::new();
        for source in sources.iter().filter(|s| s.enabled) {
            if cancel.is_cancelled() {
                break;
            }
            match self.load_one(source, None, self.max_photos_in_area, &ctx).await {
                Ok(photos) => {
                    // A stream source performs no unbounded I/O, so its empty
                    // config result must not pose as complete coverage.
                    let complete = source.kind == crate::types::SourceKind::Device;
                    self.cache_put(&source.id, photos.clone(), complete, None);
                    all.extend(photos);
                }
                Err(e) => {
                    counter!("source_load_errors_total").increment(1);
                    tracing::warn!(source = %source.id, error = %e, "config load failed, source skipped");
                }
            }
        }

        self.config_version.fetch_add(1, Ordering::SeqCst);
        Ok(all)
    }

    /// Viewport load: serve each enabled source from cache when a complete
    /// cached load covers the requested bounds, otherwise invoke its loader.
    /// Results stay keyed per source for priority-aware culling downstream.
    pub async fn process_area(
        &self,
        sources: &[SourceDescriptor],
        bounds: &Bounds,
        max_photos: usize,
        cancel: &CancelToken,
    ) -> HashMap<String, Vec<PhotoRecord>> {
        let ctx = LoadContext { cancel: cancel.clone(), auth: self.auth.clone() };
        let mut by_source = HashMap::new();

        for source in sources.iter().filter(|s| s.enabled) {
            if cancel.is_cancelled() {
                break;
            }
            if let Some(photos) = self.cache_lookup(&source.id, bounds) {
                counter!("area_cache_hits_total").increment(1);
                by_source.insert(source.id.clone(), photos);
                continue;
            }
            counter!("area_cache_misses_total").increment(1);
            match self.load_one(source, Some(bounds), max_photos, &ctx).await {
                Ok(photos) => {
                    // Capped results do not cover the rectangle completely.
                    let complete = photos.len() < max_photos && !cancel.is_cancelled();
                    self.cache_put(&source.id, photos.clone(), complete, Some(*bounds));
                    by_source.insert(source.id.clone(), photos);
                }
                Err(e) => {
                    counter!("source_load_errors_total").increment(1);
                    tracing::warn!(source = %source.id, error = %e, "area load failed, source skipped");
                }
            }
        }

        by_source
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("cache lock poisoned").clear();
    }

    async fn load_one(
        &self,
        source: &SourceDescriptor,
        bounds: Option<&Bounds>,
        limit: usize,
        ctx: &LoadContext,
    ) -> Result<Vec<PhotoRecord>, crate::error::SourceLoadError> {
        let started = std::time::Instant::now();
        let loader = self.registry.get(source.kind)?;
        let result = loader.load_photos(source, bounds, limit, ctx).await;
        metrics::histogram!("source_load_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        result
    }

    fn cache_lookup(&self, source_id: &str, bounds: &Bounds) -> Option<Vec<PhotoRecord>> {
        let cache = self.cache.lock().expect("cache lock poisoned");
        let entry = cache.get(source_id)?;
        if !entry.covers(bounds) {
            return None;
        }
        Some(entry.photos.iter().filter(|p| bounds.contains(&p.coord)).cloned().collect())
    }

    fn cache_put(&self, source_id: &str, photos: Vec<PhotoRecord>, complete: bool, cached_bounds: Option<Bounds>) {
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        cache.insert(source_id.to_string(), CacheEntry { photos, complete, cached_bounds });
    }

    /// Drop cache entries for sources no longer present or no longer enabled.
    fn evict_stale(&self, sources: &[SourceDescriptor]) {
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        cache.retain(|id, _| sources.iter().any(|s| s.id == *id && s.enabled));
    }
}
