// src/orchestrator.rs
//! Process orchestrator: single entry point for requests. Owns the process
//! table, enforces priority preemption (numerically higher process priority =
//! higher precedence, unlike source ranks), dispatches work onto the runtime
//! behind a bounded pool, and emits exactly one terminal event per
//! non-aborted process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use tokio::sync::Semaphore;

use crate::cancel::CancelToken;
use crate::cull;
use crate::envelope::{self, RangeQuery, WorkerRequest};
use crate::events::{now_millis, EventSink, WorkerEvent};
use crate::ops::PhotoOps;
use crate::types::{Bounds, SourceDescriptor};

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("processes_submitted_total", "Processes accepted by the orchestrator.");
        describe_counter!("processes_preempted_total", "Processes cancelled by a higher-precedence arrival.");
        describe_counter!("processes_aborted_total", "Processes cancelled by an explicit abort.");
        describe_counter!("events_emitted_total", "Terminal events emitted.");
        describe_counter!("request_parse_errors_total", "Malformed inbound envelopes.");
        describe_counter!("source_load_errors_total", "Contained per-source load failures.");
        describe_counter!("area_cache_hits_total", "Area requests served from the source cache.");
        describe_counter!("area_cache_misses_total", "Area requests that invoked a loader.");
        describe_histogram!("source_load_ms", "Single-source load time in milliseconds.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    ConfigUpdate,
    AreaUpdate,
}

struct ProcessRecord {
    priority: u32,
    #[allow(dead_code)]
    kind: ProcessKind,
    #[allow(dead_code)]
    started_at: DateTime<Utc>,
    cancel: CancelToken,
}

pub struct OrchestratorConfig {
    pub max_photos_in_area: usize,
    pub max_concurrent_processes: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_photos_in_area: 1_000, max_concurrent_processes: 4 }
    }
}

struct Inner {
    table: Mutex<HashMap<String, ProcessRecord>>,
    ops: PhotoOps,
    sink: Arc<dyn EventSink>,
    pool: Semaphore,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(ops: PhotoOps, sink: Arc<dyn EventSink>, cfg: &OrchestratorConfig) -> Self {
        ensure_metrics_described();
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(HashMap::new()),
                ops,
                sink,
                pool: Semaphore::new(cfg.max_concurrent_processes),
            }),
        }
    }

    /// Parse and submit one raw envelope. A malformed envelope produces one
    /// Error event and creates no process record.
    pub fn submit_json(&self, json: &str) {
        match envelope::parse_request(json) {
            Ok(request) => self.submit(request),
            Err(e) => {
                counter!("request_parse_errors_total").increment(1);
                tracing::warn!(error = %e, "rejecting malformed request");
                let process_id =
                    envelope::salvage_process_id(json).unwrap_or_else(|| "unknown".into());
                self.inner.sink.emit(WorkerEvent::Error {
                    process_id,
                    message: e.to_string(),
                    timestamp: now_millis(),
                });
            }
        }
    }

    /// Fire-and-forget submission of a validated request.
    pub fn submit(&self, request: WorkerRequest) {
        match request {
            WorkerRequest::ConfigUpdate { process_id, priority, sources, expected_version } => {
                self.accept(
                    process_id,
                    priority,
                    ProcessKind::ConfigUpdate,
                    Work::Config { sources, expected_version },
                );
            }
            WorkerRequest::AreaUpdate { process_id, priority, sources, bounds, max_photos, range } => {
                self.accept(
                    process_id,
                    priority,
                    ProcessKind::AreaUpdate,
                    Work::Area { sources, bounds, max_photos, range },
                );
            }
            WorkerRequest::Abort { process_id } => self.abort(&process_id),
            WorkerRequest::Cleanup => self.cleanup(),
        }
    }

    /// Abort one process: flag, remove, no event. Idempotent if absent.
    pub fn abort(&self, process_id: &str) {
        let mut table = self.inner.table.lock().expect("process table poisoned");
        if let Some(record) = table.remove(process_id) {
            record.cancel.cancel();
            counter!("processes_aborted_total").increment(1);
            tracing::debug!(process_id, "process aborted");
        }
    }

    /// Abort every live process, drop all source caches and close the worker
    /// pool. Terminal: later submissions are accepted but never dispatched.
    pub fn cleanup(&self) {
        {
            let mut table = self.inner.table.lock().expect("process table poisoned");
            for (_, record) in table.drain() {
                record.cancel.cancel();
            }
        }
        self.inner.ops.clear_cache();
        self.inner.pool.close();
        tracing::info!("orchestrator cleaned up");
    }

    pub fn live_process_count(&self) -> usize {
        self.inner.table.lock().expect("process table poisoned").len()
    }

    /// Insert the record, preempt strictly-lower-precedence work, dispatch.
    fn accept(&self, process_id: String, priority: u32, kind: ProcessKind, work: Work) {
        let cancel = CancelToken::new();
        {
            let mut table = self.inner.table.lock().expect("process table poisoned");

            // A resubmission under a live process id replaces it.
            if let Some(previous) = table.remove(&process_id) {
                previous.cancel.cancel();
                counter!("processes_preempted_total").increment(1);
                tracing::debug!(process_id, "replacing live process with same id");
            }

            // Preempt strictly lower precedence (numerically smaller
            // priority). Equal precedence coexists.
            table.retain(|id, record| {
                if record.priority < priority {
                    record.cancel.cancel();
                    counter!("processes_preempted_total").increment(1);
                    tracing::debug!(process_id = %id, "preempted by higher-precedence request");
                    false
                } else {
                    true
                }
            });

            table.insert(
                process_id.clone(),
                ProcessRecord { priority, kind, started_at: Utc::now(), cancel: cancel.clone() },
            );
        }
        counter!("processes_submitted_total").increment(1);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            // Bounded pool; a closed semaphore means the worker is shutting
            // down and the process is dropped, record included.
            let Ok(_permit) = inner.pool.acquire().await else {
                let mut table = inner.table.lock().expect("process table poisoned");
                table.remove(&process_id);
                return;
            };
            if cancel.is_cancelled() {
                return;
            }
            let outcome = match work {
                Work::Config { sources, expected_version } => {
                    run_config(&inner, sources, expected_version, &cancel).await
                }
                Work::Area { sources, bounds, max_photos, range } => {
                    run_area(&inner, sources, bounds, max_photos, range, &cancel).await
                }
            };
            finish(&inner, &process_id, &cancel, outcome);
        });
    }
}

enum Work {
    Config {
        sources: Vec<SourceDescriptor>,
        expected_version: Option<u64>,
    },
    Area {
        sources: Vec<SourceDescriptor>,
        bounds: Bounds,
        max_photos: usize,
        range: Option<RangeQuery>,
    },
}

/// Remove the record and emit the terminal event, unless the process was
/// aborted or superseded in the meantime. The table lock makes the stale
/// check and the removal atomic; emission happens outside the lock.
fn finish(inner: &Inner, process_id: &str, cancel: &CancelToken, outcome: Result<WorkerEvent, String>) {
    {
        let mut table = inner.table.lock().expect("process table poisoned");
        if cancel.is_cancelled() || table.remove(process_id).is_none() {
            tracing::debug!(process_id, "suppressing event for aborted process");
            return;
        }
    }
    let mut event = match outcome {
        Ok(event) => event,
        Err(message) => {
            WorkerEvent::Error { process_id: String::new(), message, timestamp: now_millis() }
        }
    };
    event.set_process_id(process_id);
    counter!("events_emitted_total").increment(1);
    inner.sink.emit(event);
}

async fn run_config(
    inner: &Inner,
    sources: Vec<SourceDescriptor>,
    expected_version: Option<u64>,
    cancel: &CancelToken,
) -> Result<WorkerEvent, String> {
    let photos = inner
        .ops
        .process_config(&sources, expected_version, cancel)
        .await
        .map_err(|e| e.to_string())?;

    let mut breakdown = std::collections::BTreeMap::new();
    for photo in &photos {
        *breakdown.entry(photo.source_id.clone()).or_insert(0usize) += 1;
    }
    Ok(WorkerEvent::PhotosUpdate {
        process_id: String::new(), // stamped on emission
        photos_in_area: photos,
        photos_in_range: Vec::new(),
        source_breakdown: breakdown,
        timestamp: now_millis(),
    })
}

async fn run_area(
    inner: &Inner,
    sources: Vec<SourceDescriptor>,
    bounds: Bounds,
    max_photos: usize,
    range: Option<RangeQuery>,
    cancel: &CancelToken,
) -> Result<WorkerEvent, String> {
    let by_source = inner.ops.process_area(&sources, &bounds, max_photos, cancel).await;

    let priority: HashMap<String, i32> =
        sources.iter().map(|s| (s.id.clone(), s.priority_rank)).collect();
    let photos_in_area = cull::cull(&by_source, max_photos, &bounds, &priority);

    let photos_in_range = match &range {
        Some(r) => cull::cull_in_range(&photos_in_area, &r.center, r.radius_m, r.max_photos),
        None => Vec::new(),
    };

    let mut breakdown = std::collections::BTreeMap::new();
    for photo in &photos_in_area {
        *breakdown.entry(photo.source_id.clone()).or_insert(0usize) += 1;
    }
    Ok(WorkerEvent::PhotosUpdate {
        process_id: String::new(), // stamped on emission
        photos_in_area,
        photos_in_range,
        source_breakdown: breakdown,
        timestamp: now_millis(),
    })
}
