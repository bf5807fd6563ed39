//! Photo worker — binary entrypoint.
//! Reads one JSON request envelope per stdin line, emits terminal events as
//! JSON lines on stdout. The embedding frontend owns both ends of the pipe.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hillview_worker::auth::StaticTokenProvider;
use hillview_worker::config;
use hillview_worker::loader::device::{EmptyStore, JsonFileStore};
use hillview_worker::loader::{LoaderRegistry, PhotoMetadataStore};
use hillview_worker::{ChannelSink, Orchestrator, PhotoOps};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hillview_worker=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        // Logs go to stderr; stdout carries the event stream.
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op elsewhere.
    let _ = dotenvy::dotenv();
    init_tracing();

    let store: Arc<dyn PhotoMetadataStore> = match std::env::var("HILLVIEW_DEVICE_DB_PATH") {
        Ok(path) => Arc::new(JsonFileStore::new(path)),
        Err(_) => Arc::new(EmptyStore),
    };
    let auth = StaticTokenProvider::new(std::env::var("HILLVIEW_AUTH_TOKEN").ok());

    let cfg = config::orchestrator_config_from_env();
    let ops = PhotoOps::new(LoaderRegistry::standard(store), auth, cfg.max_photos_in_area);
    let (sink, mut events) = ChannelSink::new();
    let orchestrator = Orchestrator::new(ops, Arc::new(sink), &cfg);

    // Event pump: terminal events out as JSON lines.
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!(error = %e, "failed to serialize event"),
            }
        }
    });

    // A configured source list triggers an initial config load so the device
    // cache is warm before the first viewport request.
    match config::load_sources_default() {
        Ok(sources) if !sources.is_empty() => {
            tracing::info!(count = sources.len(), "submitting startup config load");
            orchestrator.submit(hillview_worker::WorkerRequest::ConfigUpdate {
                process_id: "startup-config".into(),
                priority: 0,
                sources,
                expected_version: None,
            });
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "source list config not loaded"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        orchestrator.submit_json(line);
    }

    tracing::info!("stdin closed, shutting down");
    orchestrator.cleanup();
    drop(orchestrator);
    let _ = writer.await;
    Ok(())
}
