//! Textual chain codecs. Three dialects are recognized on upload (JSON, YAML
//! and a line-oriented plain-text format) and the same three are offered for
//! export. The parser hands back loosely-typed records; field coercion and
//! validation belong to `powchain-core`.

mod plaintext;

use powchain_core::Block;
use serde_json::{json, Value};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported or malformed chain document: {0}")]
    Unrecognized(String),
    #[error("unknown chain format `{0}` (expected json, yaml or text)")]
    UnknownFormat(String),
    #[error("json render failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml render failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainFormat {
    Json,
    Yaml,
    Text,
}

impl ChainFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ChainFormat::Json => "json",
            ChainFormat::Yaml => "yaml",
            ChainFormat::Text => "text",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ChainFormat::Json => "application/json",
            ChainFormat::Yaml => "application/x-yaml",
            ChainFormat::Text => "text/plain; charset=utf-8",
        }
    }
}

impl FromStr for ChainFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ChainFormat::Json),
            "yaml" | "yml" => Ok(ChainFormat::Yaml),
            "text" | "txt" => Ok(ChainFormat::Text),
            other => Err(CodecError::UnknownFormat(other.to_string())),
        }
    }
}

/// Parses an uploaded chain document, trying JSON, then YAML, then the
/// plain-text fallback. Succeeds as soon as one dialect yields at least one
/// block-like record; malformed records inside a parseable document pass
/// through so corruption is reported per block by the validator instead of
/// being rejected wholesale here.
pub fn parse_chain(input: &str) -> Result<Vec<Value>, CodecError> {
    if let Some(records) = parse_json(input) {
        debug!(records = records.len(), "upload parsed as json");
        return Ok(records);
    }
    if let Some(records) = parse_yaml(input) {
        debug!(records = records.len(), "upload parsed as yaml");
        return Ok(records);
    }
    let records = plaintext::parse(input)?;
    debug!(records = records.len(), "upload parsed as plain text");
    Ok(records)
}

/// Renders a chain snapshot in the requested dialect. Read-only.
pub fn export_chain(blocks: &[Block], format: ChainFormat) -> Result<String, CodecError> {
    match format {
        ChainFormat::Json => Ok(serde_json::to_string_pretty(&document(blocks))?),
        ChainFormat::Yaml => Ok(serde_yaml::to_string(&document(blocks))?),
        ChainFormat::Text => Ok(plaintext::render(blocks)),
    }
}

fn document(blocks: &[Block]) -> Value {
    json!({ "chain": blocks })
}

fn parse_json(input: &str) -> Option<Vec<Value>> {
    serde_json::from_str::<Value>(input).ok().and_then(extract_records)
}

fn parse_yaml(input: &str) -> Option<Vec<Value>> {
    // YAML accepts nearly any text as a bare scalar; only a document that
    // actually carries a record array counts as the YAML dialect.
    serde_yaml::from_str::<Value>(input).ok().and_then(extract_records)
}

/// Accepts either a top-level array of records or a `{chain: [...]}` document
/// (any casing of the `chain` key).
fn extract_records(doc: Value) -> Option<Vec<Value>> {
    let records = match doc {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("chain"))
            .and_then(|(_, value)| match value {
                Value::Array(items) => Some(items),
                _ => None,
            })?,
        _ => return None,
    };
    if records.is_empty() {
        return None;
    }
    Some(records)
}
