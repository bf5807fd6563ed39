// src/envelope.rs
// Inbound message envelope `{type, messageId, processId, priority, data}` and
// its strongly typed request union. Missing or invalid fields become
// `RequestParseError`, never a panic.

use serde::Deserialize;

use crate::error::RequestParseError;
use crate::types::{Bounds, GeoPoint, SourceDescriptor};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[allow(dead_code)]
    message_id: Option<String>,
    process_id: Option<String>,
    priority: Option<i64>,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigData {
    sources: Vec<SourceDescriptor>,
    #[serde(default)]
    expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AreaData {
    sources: Vec<SourceDescriptor>,
    bounds: Bounds,
    max_photos: i64,
    #[serde(default)]
    range: Option<RawRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRange {
    center: GeoPoint,
    radius_m: f64,
    max_photos: i64,
}

/// Proximity overlay parameters carried alongside an area request.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub center: GeoPoint,
    pub radius_m: f64,
    pub max_photos: usize,
}

/// Validated request union handed to the orchestrator.
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    ConfigUpdate {
        process_id: String,
        priority: u32,
        sources: Vec<SourceDescriptor>,
        expected_version: Option<u64>,
    },
    AreaUpdate {
        process_id: String,
        priority: u32,
        sources: Vec<SourceDescriptor>,
        bounds: Bounds,
        max_photos: usize,
        range: Option<RangeQuery>,
    },
    Abort {
        process_id: String,
    },
    Cleanup,
}

pub fn parse_request(json: &str) -> Result<WorkerRequest, RequestParseError> {
    let raw: RawEnvelope = serde_json::from_str(json)
        .map_err(|e| RequestParseError::new(format!("invalid envelope: {e}")))?;

    match raw.kind.as_str() {
        "configUpdate" => {
            let (process_id, priority) = process_fields(&raw)?;
            let data: ConfigData = decode_data(raw.data, "configUpdate")?;
            Ok(WorkerRequest::ConfigUpdate {
                process_id,
                priority,
                sources: data.sources,
                expected_version: data.expected_version,
            })
        }
        "areaUpdate" => {
            let (process_id, priority) = process_fields(&raw)?;
            let data: AreaData = decode_data(raw.data, "areaUpdate")?;
            if !data.bounds.is_valid() {
                return Err(RequestParseError::new("areaUpdate bounds are degenerate or inverted"));
            }
            if data.max_photos < 0 {
                return Err(RequestParseError::new("maxPhotos must be non-negative"));
            }
            let range = data.range.map(validate_range).transpose()?;
            Ok(WorkerRequest::AreaUpdate {
                process_id,
                priority,
                sources: data.sources,
                bounds: data.bounds,
                max_photos: data.max_photos as usize,
                range,
            })
        }
        "abort" => {
            let process_id = raw
                .process_id
                .ok_or_else(|| RequestParseError::new("abort requires processId"))?;
            Ok(WorkerRequest::Abort { process_id })
        }
        "cleanup" => Ok(WorkerRequest::Cleanup),
        other => Err(RequestParseError::new(format!("unknown request type {other:?}"))),
    }
}

/// Best-effort process id extraction from an envelope that failed full
/// parsing, so the error event can still be correlated by the caller.
pub fn salvage_process_id(json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    value.get("processId")?.as_str().map(str::to_owned)
}

fn process_fields(raw: &RawEnvelope) -> Result<(String, u32), RequestParseError> {
    let process_id = raw
        .process_id
        .clone()
        .ok_or_else(|| RequestParseError::new("missing processId"))?;
    let priority = raw
        .priority
        .ok_or_else(|| RequestParseError::new("missing priority"))?;
    let priority = u32::try_from(priority)
        .map_err(|_| RequestParseError::new("priority must be a small non-negative integer"))?;
    Ok((process_id, priority))
}

fn decode_data<T: serde::de::DeserializeOwned>(
    data: Option<serde_json::Value>,
    kind: &str,
) -> Result<T, RequestParseError> {
    let data = data.ok_or_else(|| RequestParseError::new(format!("{kind} requires data")))?;
    serde_json::from_value(data)
        .map_err(|e| RequestParseError::new(format!("invalid {kind} data: {e}")))
}

fn validate_range(raw: RawRange) -> Result<RangeQuery, RequestParseError> {
    if !raw.radius_m.is_finite() || raw.radius_m < 0.0 {
        return Err(RequestParseError::new("range radius must be finite and non-negative"));
    }
    if raw.max_photos < 0 {
        return Err(RequestParseError::new("range maxPhotos must be non-negative"));
    }
    Ok(RangeQuery {
        center: raw.center,
        radius_m: raw.radius_m,
        max_photos: raw.max_photos as usize,
    })
}
