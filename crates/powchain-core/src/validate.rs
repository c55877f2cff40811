//! Shared per-block validity rules plus the tolerant checker for chains
//! supplied from outside the process (uploaded files, other nodes' exports).

use crate::constants::GENESIS_PREV_HASH;
use crate::{pow, Block};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Verdict for a single block. All five checks are evaluated and reported
/// unconditionally, even once `cascaded` is already true, so a consumer can
/// explain why a later block is locally broken in addition to "broken by
/// inheritance".
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockCheck {
    pub index: u64,
    pub is_hash_valid: bool,
    pub is_pow_valid: bool,
    pub is_prev_valid: bool,
    pub is_index_valid: bool,
    pub block_valid: bool,
    pub cascaded: bool,
    /// Present only when checking an externally supplied chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches_server_genesis: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub invalid_block_indices: Vec<u64>,
    pub details: Vec<BlockCheck>,
}

/// Whether the pass should compare position 0 against the live genesis hash.
#[derive(Clone, Copy)]
pub(crate) enum GenesisAnchor<'a> {
    /// The process-owned chain; no cross-origin column in the report.
    Own,
    /// An uploaded chain, checked against the live genesis hash if one exists.
    External(Option<&'a str>),
}

/// Walks the sequence once. A block that fails any of the four structural
/// checks poisons every descendant: later blocks report `cascaded == true`
/// and `block_valid == false` even when internally self-consistent, but only
/// the block that introduced the break lands in `invalid_block_indices`.
///
/// A genesis mismatch against the live chain fails `block_valid` at position
/// 0 without cascading; it says "foreign origin", not "broken link".
pub(crate) fn run(blocks: &[Block], difficulty: usize, anchor: GenesisAnchor<'_>) -> ValidationReport {
    let mut details = Vec::with_capacity(blocks.len());
    let mut invalid_block_indices = Vec::new();
    let mut cascaded = false;

    for (i, block) in blocks.iter().enumerate() {
        let is_hash_valid = block.compute_hash() == block.hash;
        let is_pow_valid = pow::meets_difficulty(&block.hash, difficulty);
        let (is_index_valid, is_prev_valid) = if i == 0 {
            (block.index == 0, block.previous_hash == GENESIS_PREV_HASH)
        } else {
            let prev = &blocks[i - 1];
            // The link is checked against the predecessor's recomputed hash,
            // not its stored one, so a forged pointer is caught here while a
            // forged stored hash is caught by the predecessor's own check.
            (
                prev.index.checked_add(1) == Some(block.index),
                block.previous_hash == prev.compute_hash(),
            )
        };
        let matches_server_genesis = match anchor {
            GenesisAnchor::Own => None,
            GenesisAnchor::External(expected) => {
                Some(i != 0 || expected.is_none_or(|g| block.hash == g))
            }
        };

        let self_consistent = is_hash_valid && is_pow_valid && is_prev_valid && is_index_valid;
        let genesis_ok = matches_server_genesis.unwrap_or(true);
        let block_valid = self_consistent && genesis_ok && !cascaded;
        if !cascaded && !(self_consistent && genesis_ok) {
            invalid_block_indices.push(block.index);
        }
        details.push(BlockCheck {
            index: block.index,
            is_hash_valid,
            is_pow_valid,
            is_prev_valid,
            is_index_valid,
            block_valid,
            cascaded,
            matches_server_genesis,
        });
        if !self_consistent {
            cascaded = true;
        }
    }

    let is_valid = details.iter().all(|d| d.block_valid);
    ValidationReport {
        is_valid,
        invalid_block_indices,
        details,
    }
}

/// Checks a sequence of loosely-typed records against `difficulty`. Pure:
/// never touches the live chain and never fails; malformed fields coerce to
/// values that simply fail the relevant boolean check.
pub fn validate_external_chain(
    records: &[Value],
    difficulty: usize,
    server_genesis_hash: Option<&str>,
) -> ValidationReport {
    let blocks: Vec<Block> = records.iter().map(coerce_record).collect();
    run(&blocks, difficulty, GenesisAnchor::External(server_genesis_hash))
}

/// Unparseable index sentinel; fails the sequence check at any position.
const BAD_INDEX: u64 = u64::MAX;

/// Normalizes one foreign record into the canonical block shape. Externally
/// authored files are not guaranteed to match the canonical field names, so
/// keys are matched after case-folding and stripping `_`, `-` and spaces
/// (`previousHash`, `prev_hash`, `Previous Hash` all land on the same slot).
pub fn coerce_record(record: &Value) -> Block {
    let fields = match record.as_object() {
        Some(map) => normalized(map),
        None => HashMap::new(),
    };
    Block {
        index: fields
            .get("index")
            .and_then(|v| coerce_int(v))
            .unwrap_or(BAD_INDEX),
        timestamp: fields.get("timestamp").map(|v| coerce_string(v)).unwrap_or_default(),
        data: fields.get("data").map(|v| (*v).clone()).unwrap_or(Value::Null),
        previous_hash: fields
            .get("previoushash")
            .or_else(|| fields.get("prevhash"))
            .map(|v| coerce_string(v))
            .unwrap_or_default(),
        nonce: fields.get("nonce").and_then(|v| coerce_int(v)).unwrap_or(0),
        hash: fields.get("hash").map(|v| coerce_string(v)).unwrap_or_default(),
    }
}

fn normalized(map: &Map<String, Value>) -> HashMap<String, &Value> {
    let mut out = HashMap::with_capacity(map.len());
    for (key, value) in map {
        let folded: String = key
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        out.entry(folded).or_insert(value);
    }
    out
}

fn coerce_int(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
        }
        _ => None,
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
