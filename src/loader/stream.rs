// src/loader/stream.rs
//! Stream loader: consumes a server-sent-event photo feed. Frames arrive as
//! `data: {json}\n\n` blocks whose JSON carries a `type` of `photos`,
//! `stream_complete` or `error`. The loader filters accumulated photos by the
//! requested bounds after every frame and terminates early once the filtered
//! count reaches the limit. A 401/403 triggers exactly one retry with a
//! freshly fetched token; any other HTTP failure propagates.

use futures_util::StreamExt;
use metrics::counter;
use serde::Deserialize;

use crate::error::SourceLoadError;
use crate::types::{Bounds, PhotoRecord, SourceDescriptor};

use super::{LoadContext, SourceLoader};

pub struct StreamLoader {
    mode: Mode,
}

enum Mode {
    Http { client: reqwest::Client },
    /// Pre-recorded SSE body split into network-sized chunks; lets tests
    /// drive the frame parser without a server.
    Fixture(Vec<String>),
}

/// Incremental SSE frame parser. Feed it body chunks; it yields the `data:`
/// payload of every completed (blank-line-terminated) frame.
#[derive(Default)]
pub struct SseFrameParser {
    buf: String,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut frames = Vec::new();
        while let Some(split) = self.buf.find("\n\n") {
            let raw: String = self.buf.drain(..split + 2).collect();
            let mut data = String::new();
            for line in raw.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    if !data.is_empty() {
                        data.push('\n');
                    }
                    data.push_str(rest.trim_start());
                }
            }
            if !data.is_empty() {
                frames.push(data);
            }
        }
        frames
    }
}

#[derive(Debug, Deserialize)]
struct FrameData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    photos: Vec<PhotoRecord>,
    #[serde(default)]
    message: Option<String>,
}

enum FrameOutcome {
    Continue,
    Complete,
}

/// Accumulates in-bounds photos across frames for one load.
struct FrameAccumulator {
    photos: Vec<PhotoRecord>,
    limit: usize,
}

impl FrameAccumulator {
    fn new(limit: usize) -> Self {
        Self { photos: Vec::new(), limit }
    }

    fn apply(
        &mut self,
        payload: &str,
        source: &SourceDescriptor,
        bounds: &Bounds,
    ) -> Result<FrameOutcome, SourceLoadError> {
        let frame: FrameData = serde_json::from_str(payload)
            .map_err(|e| SourceLoadError::Parse(format!("bad frame: {e}")))?;
        match frame.kind.as_str() {
            "photos" => {
                counter!("stream_frames_total").increment(1);
                for mut photo in frame.photos {
                    if bounds.contains(&photo.coord) {
                        photo.source_id = source.id.clone();
                        self.photos.push(photo);
                        if self.photos.len() >= self.limit {
                            return Ok(FrameOutcome::Complete);
                        }
                    }
                }
                Ok(FrameOutcome::Continue)
            }
            "stream_complete" => Ok(FrameOutcome::Complete),
            "error" => Err(SourceLoadError::StreamError(
                frame.message.unwrap_or_else(|| "unspecified".into()),
            )),
            // Unknown frame types (cache status etc.) are skipped.
            _ => Ok(FrameOutcome::Continue),
        }
    }
}

impl StreamLoader {
    pub fn from_http() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .read_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { mode: Mode::Http { client } }
    }

    pub fn from_fixture(chunks: Vec<String>) -> Self {
        Self { mode: Mode::Fixture(chunks) }
    }

    async fn load_http(
        &self,
        client: &reqwest::Client,
        source: &SourceDescriptor,
        bounds: &Bounds,
        limit: usize,
        ctx: &LoadContext,
    ) -> Result<Vec<PhotoRecord>, SourceLoadError> {
        let url = source
            .endpoint_url
            .as_deref()
            .ok_or_else(|| SourceLoadError::MissingEndpoint(source.id.clone()))?;

        let mut retried = false;
        loop {
            if ctx.cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            let mut request = client.get(url).query(&[
                ("top_left_lat", bounds.top_left.lat),
                ("top_left_lng", bounds.top_left.lng),
                ("bottom_right_lat", bounds.bottom_right.lat),
                ("bottom_right_lng", bounds.bottom_right.lng),
            ]);
            request = request.query(&[("limit", limit as u64)]);
            if let Some(token) = ctx.auth.fetch_token().await {
                request = request.query(&[("token", token.as_str())]);
            }

            let response = request.send().await?;
            let status = response.status();
            let auth_rejected = status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN;
            if auth_rejected && !retried {
                // One retry with a freshly fetched token, then give up.
                retried = true;
                counter!("stream_auth_retries_total").increment(1);
                tracing::warn!(source = %source.id, %status, "auth rejected, retrying with fresh token");
                continue;
            }
            if auth_rejected {
                return Err(SourceLoadError::Auth);
            }
            if status.as_u16() >= 400 {
                return Err(SourceLoadError::Status(status.as_u16()));
            }

            let mut parser = SseFrameParser::new();
            let mut acc = FrameAccumulator::new(limit);
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                if ctx.cancel.is_cancelled() {
                    return Ok(acc.photos);
                }
                let chunk = chunk?;
                for payload in parser.feed(&String::from_utf8_lossy(&chunk)) {
                    match acc.apply(&payload, source, bounds)? {
                        FrameOutcome::Continue => {}
                        FrameOutcome::Complete => return Ok(acc.photos),
                    }
                }
            }
            return Ok(acc.photos);
        }
    }

    fn load_fixture(
        &self,
        chunks: &[String],
        source: &SourceDescriptor,
        bounds: &Bounds,
        limit: usize,
        ctx: &LoadContext,
    ) -> Result<Vec<PhotoRecord>, SourceLoadError> {
        let mut parser = SseFrameParser::new();
        let mut acc = FrameAccumulator::new(limit);
        for chunk in chunks {
            if ctx.cancel.is_cancelled() {
                return Ok(acc.photos);
            }
            for payload in parser.feed(chunk) {
                match acc.apply(&payload, source, bounds)? {
                    FrameOutcome::Continue => {}
                    FrameOutcome::Complete => return Ok(acc.photos),
                }
            }
        }
        Ok(acc.photos)
    }
}

#[async_trait::async_trait]
impl SourceLoader for StreamLoader {
    async fn load_photos(
        &self,
        source: &SourceDescriptor,
        bounds: Option<&Bounds>,
        limit: usize,
        ctx: &LoadContext,
    ) -> Result<Vec<PhotoRecord>, SourceLoadError> {
        // A stream source cannot be queried unbounded; no I/O at all.
        let Some(bounds) = bounds else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        match &self.mode {
            Mode::Http { client } => self.load_http(client, source, bounds, limit, ctx).await,
            Mode::Fixture(chunks) => self.load_fixture(chunks, source, bounds, limit, ctx),
        }
    }
}
