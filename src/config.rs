// src/config.rs
// Worker configuration: source list from a TOML/JSON file, tunables from the
// environment.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::orchestrator::OrchestratorConfig;
use crate::types::SourceDescriptor;

const ENV_SOURCES_PATH: &str = "HILLVIEW_SOURCES_PATH";
const ENV_MAX_PHOTOS: &str = "HILLVIEW_MAX_PHOTOS_IN_AREA";
const ENV_MAX_PROCESSES: &str = "HILLVIEW_MAX_CONCURRENT_PROCESSES";

#[derive(Debug, Deserialize)]
struct SourcesFile {
    sources: Vec<SourceDescriptor>,
}

/// Load the source list from an explicit path. Supports TOML or JSON.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceDescriptor>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load the source list using env var + fallbacks:
/// 1) $HILLVIEW_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_sources_default() -> Result<Vec<SourceDescriptor>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(anyhow!("HILLVIEW_SOURCES_PATH points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceDescriptor>> {
    if hint_ext == "json" {
        let file: SourcesFile = serde_json::from_str(s).context("parsing json source list")?;
        return Ok(file.sources);
    }
    let file: SourcesFile = toml::from_str(s).context("parsing toml source list")?;
    Ok(file.sources)
}

/// Orchestrator tunables from the environment, with defaults.
pub fn orchestrator_config_from_env() -> OrchestratorConfig {
    let defaults = OrchestratorConfig::default();
    OrchestratorConfig {
        max_photos_in_area: env_usize(ENV_MAX_PHOTOS, defaults.max_photos_in_area),
        max_concurrent_processes: env_usize(ENV_MAX_PROCESSES, defaults.max_concurrent_processes),
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;

    #[test]
    fn parses_toml_source_list() {
        let toml = r#"
            [[sources]]
            id = "device"
            kind = "device"
            enabled = true
            priorityRank = 0

            [[sources]]
            id = "hillview"
            kind = "stream"
            enabled = true
            priorityRank = 1
            endpointUrl = "https://photos.example/api/stream"
        "#;
        let sources = parse_sources(toml, "toml").unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].kind, SourceKind::Stream);
        assert_eq!(sources[1].endpoint_url.as_deref(), Some("https://photos.example/api/stream"));
    }

    #[test]
    fn parses_json_source_list() {
        let json = r#"{"sources": [
            {"id": "device", "kind": "device", "enabled": false, "priorityRank": 2}
        ]}"#;
        let sources = parse_sources(json, "json").unwrap();
        assert_eq!(sources.len(), 1);
        assert!(!sources[0].enabled);
    }
}
