//! Line-oriented fallback dialect: blocks as `---`-delimited sections of
//! `Label: value` lines (Index, Timestamp, Previous Hash, Hash, Data, Nonce).

use crate::CodecError;
use powchain_core::{canonical_data, Block};
use serde_json::{Map, Value};

pub(crate) fn parse(input: &str) -> Result<Vec<Value>, CodecError> {
    let records: Vec<Value> = split_sections(input)
        .into_iter()
        .filter_map(parse_section)
        .collect();
    if records.is_empty() {
        return Err(CodecError::Unrecognized(
            "no blocks could be extracted from the upload".to_string(),
        ));
    }
    Ok(records)
}

pub(crate) fn render(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(section)
        .collect::<Vec<_>>()
        .join("---\n")
}

fn section(block: &Block) -> String {
    format!(
        "Index: {}\nTimestamp: {}\nPrevious Hash: {}\nHash: {}\nData: {}\nNonce: {}\n",
        block.index,
        block.timestamp,
        block.previous_hash,
        block.hash,
        canonical_data(&block.data),
        block.nonce,
    )
}

fn split_sections(input: &str) -> Vec<Vec<&str>> {
    let mut sections = vec![Vec::new()];
    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-') {
            sections.push(Vec::new());
        } else if let Some(current) = sections.last_mut() {
            current.push(line);
        }
    }
    sections
}

/// A section counts as a record when at least one recognized label is
/// present. Unknown labels are skipped; the value side keeps everything
/// after the first colon, so timestamps survive intact.
fn parse_section(lines: Vec<&str>) -> Option<Value> {
    let mut fields = Map::new();
    for line in lines {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match normalize(label).as_str() {
            "index" => {
                fields.insert("index".to_string(), number_or_string(value));
            }
            "timestamp" => {
                fields.insert("timestamp".to_string(), Value::String(value.to_string()));
            }
            "previoushash" | "prevhash" => {
                fields.insert("previousHash".to_string(), Value::String(value.to_string()));
            }
            "hash" => {
                fields.insert("hash".to_string(), Value::String(value.to_string()));
            }
            "data" => {
                let data = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                fields.insert("data".to_string(), data);
            }
            "nonce" => {
                fields.insert("nonce".to_string(), number_or_string(value));
            }
            _ => {}
        }
    }
    if fields.is_empty() {
        None
    } else {
        Some(Value::Object(fields))
    }
}

fn normalize(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn number_or_string(value: &str) -> Value {
    value
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(value.to_string()))
}
