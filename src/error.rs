// src/error.rs
use thiserror::Error;

/// Failure of a single source load. Contained inside photo operations: the
/// source contributes zero photos, siblings keep going.
#[derive(Debug, Error)]
pub enum SourceLoadError {
    #[error("http status {0}")]
    Status(u16),

    #[error("stream error frame: {0}")]
    StreamError(String),

    #[error("auth token unavailable")]
    Auth,

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata store: {0}")]
    Store(String),

    #[error("parse: {0}")]
    Parse(String),

    #[error("source {0} has no endpoint url")]
    MissingEndpoint(String),

    #[error("no loader registered for source kind {0:?}")]
    UnknownKind(crate::types::SourceKind),
}

/// Malformed inbound envelope. Produces one Error event and no process
/// record.
#[derive(Debug, Error)]
#[error("request parse error: {0}")]
pub struct RequestParseError(pub String);

impl RequestParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
