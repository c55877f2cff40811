use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub mod constants;
pub mod error;
pub mod validate;

pub use chain::Blockchain;
pub use error::{Error, Result};
pub use validate::{coerce_record, validate_external_chain, BlockCheck, ValidationReport};

/// One ledger entry. Mutable only between construction and the end of its
/// proof-of-work search; a block in the live chain is frozen.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    pub data: Value,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    pub fn new(index: u64, timestamp: String, data: Value, previous_hash: String) -> Self {
        let mut block = Self {
            index,
            timestamp,
            data,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// SHA-256 over the canonical concatenation of the stored fields, hex
    /// encoded. Never reads `hash`: the stored hash is a cache this refreshes,
    /// not a source of truth.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_string());
        hasher.update(&self.timestamp);
        hasher.update(canonical_data(&self.data));
        hasher.update(&self.previous_hash);
        hasher.update(self.nonce.to_string());
        hex::encode(hasher.finalize())
    }
}

/// Stable textual encoding of a payload, shared by the mining and the
/// validation side. Any divergence between the two produces false-negative
/// tamper detection, so both must run this exact encoder.
pub fn canonical_data(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

pub mod pow {
    use super::Block;
    use crate::error::{Error, Result};
    use tracing::debug;

    /// True when `hash` starts with `difficulty` hex zero characters.
    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        hash.len() >= difficulty && hash.as_bytes()[..difficulty].iter().all(|b| *b == b'0')
    }

    /// Sequential nonce search: recompute the hash from the current nonce,
    /// stop once it satisfies the target prefix, otherwise increment by one
    /// and retry. Mutates only `nonce` and `hash`.
    ///
    /// With `limit == None` the search is unbounded, matching the reference
    /// behavior; for difficulty large relative to the hash width it may run
    /// indefinitely. That is a liveness risk inherent to proof-of-work, not
    /// an error. Callers sitting behind a request boundary should pass a cap
    /// and surface [`Error::MiningExhausted`].
    pub fn mine(block: &mut Block, difficulty: usize, limit: Option<u64>) -> Result<String> {
        let mut attempts: u64 = 0;
        loop {
            block.hash = block.compute_hash();
            if meets_difficulty(&block.hash, difficulty) {
                debug!(index = block.index, nonce = block.nonce, hash = %block.hash, "mined block");
                return Ok(block.hash.clone());
            }
            attempts += 1;
            if let Some(cap) = limit {
                if attempts >= cap {
                    return Err(Error::MiningExhausted { difficulty, limit: cap });
                }
            }
            block.nonce = block.nonce.wrapping_add(1);
        }
    }
}

pub mod chain {
    use super::{pow, Block};
    use crate::constants::{GENESIS_PAYLOAD, GENESIS_PREV_HASH};
    use crate::error::Result;
    use crate::validate::{self, GenesisAnchor, ValidationReport};
    use chrono::Utc;
    use serde_json::Value;
    use tracing::info;

    /// The process-owned ledger: an append-only sequence anchored by a mined
    /// genesis block. Constructed explicitly and passed to whatever layer
    /// needs it, so tests can hold several independent chains.
    #[derive(Clone, Debug)]
    pub struct Blockchain {
        difficulty: usize,
        nonce_limit: Option<u64>,
        pub(crate) chain: Vec<Block>,
    }

    impl Blockchain {
        /// Unbounded mining, one difficulty for the whole chain.
        pub fn new(difficulty: usize) -> Result<Self> {
            Self::with_nonce_limit(difficulty, None)
        }

        /// `nonce_limit` caps every mining search so a handler driving this
        /// chain cannot hang forever under pathological difficulty.
        pub fn with_nonce_limit(difficulty: usize, nonce_limit: Option<u64>) -> Result<Self> {
            let mut genesis = Block::new(
                0,
                Utc::now().to_rfc3339(),
                Value::String(GENESIS_PAYLOAD.to_string()),
                GENESIS_PREV_HASH.to_string(),
            );
            pow::mine(&mut genesis, difficulty, nonce_limit)?;
            info!(difficulty, hash = %genesis.hash, "genesis block mined");
            Ok(Self {
                difficulty,
                nonce_limit,
                chain: vec![genesis],
            })
        }

        pub fn difficulty(&self) -> usize {
            self.difficulty
        }

        pub fn blocks(&self) -> &[Block] {
            &self.chain
        }

        pub fn len(&self) -> usize {
            self.chain.len()
        }

        pub fn is_empty(&self) -> bool {
            self.chain.is_empty()
        }

        pub fn tip(&self) -> &Block {
            self.chain.last().expect("chain holds at least the genesis block")
        }

        pub fn genesis_hash(&self) -> &str {
            &self.chain[0].hash
        }

        /// The only mutator. Builds the successor of the current tip, mines
        /// it, appends it. Accepts any serializable payload; the sole failure
        /// mode is an exhausted nonce cap.
        pub fn add_block(&mut self, data: Value) -> Result<&Block> {
            let (index, previous_hash) = {
                let tip = self.tip();
                (tip.index + 1, tip.hash.clone())
            };
            let mut block = Block::new(index, Utc::now().to_rfc3339(), data, previous_hash);
            pow::mine(&mut block, self.difficulty, self.nonce_limit)?;
            info!(index, nonce = block.nonce, "block appended");
            self.chain.push(block);
            Ok(self.tip())
        }

        /// Re-derives every block's hash and link; see [`crate::validate`].
        pub fn validate(&self) -> ValidationReport {
            validate::run(&self.chain, self.difficulty, GenesisAnchor::Own)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GENESIS_PREV_HASH;
    use serde_json::json;

    fn fixed_block(index: u64, data: Value, previous_hash: &str) -> Block {
        Block::new(
            index,
            "2024-05-01T12:00:00+00:00".to_string(),
            data,
            previous_hash.to_string(),
        )
    }

    #[test]
    fn compute_hash_is_deterministic() {
        let block = fixed_block(0, json!({"note": "x"}), GENESIS_PREV_HASH);
        assert_eq!(block.compute_hash(), block.compute_hash());
        assert_eq!(block.hash, block.compute_hash());
        assert_eq!(block.hash.len(), constants::HASH_HEX_SIZE);
    }

    #[test]
    fn compute_hash_ignores_stored_hash() {
        let mut block = fixed_block(0, json!("payload"), GENESIS_PREV_HASH);
        let before = block.compute_hash();
        block.hash = "f".repeat(64);
        assert_eq!(block.compute_hash(), before);
    }

    #[test]
    fn hash_changes_with_every_field() {
        let base = fixed_block(1, json!({"a": 1}), "abc");
        let h = base.compute_hash();

        let mut b = base.clone();
        b.index = 2;
        assert_ne!(b.compute_hash(), h);

        let mut b = base.clone();
        b.timestamp = "2024-05-01T12:00:01+00:00".into();
        assert_ne!(b.compute_hash(), h);

        let mut b = base.clone();
        b.data = json!({"a": 2});
        assert_ne!(b.compute_hash(), h);

        let mut b = base.clone();
        b.previous_hash = "abd".into();
        assert_ne!(b.compute_hash(), h);

        let mut b = base.clone();
        b.nonce = 1;
        assert_ne!(b.compute_hash(), h);
    }

    #[test]
    fn canonical_data_is_stable_for_objects() {
        // serde_json's Value keeps map keys ordered, so the same in-memory
        // value always renders to the same string.
        let a = json!({"b": 2, "a": 1});
        let b = json!({"a": 1, "b": 2});
        assert_eq!(canonical_data(&a), canonical_data(&b));
    }

    #[test]
    fn meets_difficulty_examples() {
        assert!(pow::meets_difficulty("000abc", 3));
        assert!(pow::meets_difficulty("000abc", 0));
        assert!(!pow::meets_difficulty("00abc", 3));
        assert!(!pow::meets_difficulty("", 1));
        assert!(pow::meets_difficulty("", 0));
        assert!(!pow::meets_difficulty("0", 2));
    }

    #[test]
    fn mine_block_satisfies_target() {
        let mut block = fixed_block(0, json!("mine me"), GENESIS_PREV_HASH);
        let hash = pow::mine(&mut block, 2, None).unwrap();
        assert!(hash.starts_with("00"));
        assert_eq!(block.hash, hash);
        assert_eq!(block.compute_hash(), hash);
    }

    #[test]
    fn mine_is_deterministic_for_fixed_start() {
        let a = {
            let mut block = fixed_block(0, json!("same"), GENESIS_PREV_HASH);
            pow::mine(&mut block, 2, None).unwrap();
            block
        };
        let b = {
            let mut block = fixed_block(0, json!("same"), GENESIS_PREV_HASH);
            pow::mine(&mut block, 2, None).unwrap();
            block
        };
        assert_eq!(a.nonce, b.nonce);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn mine_zero_difficulty_keeps_initial_nonce() {
        let mut block = fixed_block(0, json!("free"), GENESIS_PREV_HASH);
        pow::mine(&mut block, 0, None).unwrap();
        assert_eq!(block.nonce, 0);
    }

    #[test]
    fn mine_respects_nonce_cap() {
        let mut block = fixed_block(0, json!("capped"), GENESIS_PREV_HASH);
        let err = pow::mine(&mut block, 6, Some(10)).unwrap_err();
        match err {
            Error::MiningExhausted { difficulty, limit } => {
                assert_eq!(difficulty, 6);
                assert_eq!(limit, 10);
            }
        }
    }

    #[test]
    fn genesis_invariants() {
        let chain = Blockchain::new(2).unwrap();
        let genesis = &chain.blocks()[0];
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, GENESIS_PREV_HASH);
        assert!(genesis.hash.starts_with("00"));
        let report = chain.validate();
        assert!(report.details[0].is_prev_valid);
        assert!(report.is_valid);
    }

    #[test]
    fn genesis_meets_difficulty_three() {
        let chain = Blockchain::new(3).unwrap();
        assert!(chain.genesis_hash().starts_with("000"));
    }

    #[test]
    fn add_block_links_to_previous_tip() {
        let mut chain = Blockchain::new(2).unwrap();
        let tip_hash_before = chain.tip().hash.clone();
        let len_before = chain.len();
        chain.add_block(json!({"note": "x"})).unwrap();
        assert_eq!(chain.len(), len_before + 1);
        let new_block = chain.tip();
        assert_eq!(new_block.previous_hash, tip_hash_before);
        assert_eq!(new_block.index, 1);
        assert!(new_block.hash.starts_with("00"));
    }

    #[test]
    fn two_appends_validate_clean() {
        let mut chain = Blockchain::new(2).unwrap();
        chain.add_block(json!({"note": "x"})).unwrap();
        chain.add_block(json!({"note": "x"})).unwrap();
        let report = chain.validate();
        assert!(report.is_valid);
        assert!(report.invalid_block_indices.is_empty());
        assert_eq!(report.details.len(), 3);
        assert!(report.details.iter().all(|d| d.block_valid && !d.cascaded));
        // Internal validation carries no cross-origin column.
        assert!(report.details.iter().all(|d| d.matches_server_genesis.is_none()));
    }

    #[test]
    fn validate_is_idempotent() {
        let mut chain = Blockchain::new(2).unwrap();
        chain.add_block(json!([1, 2, 3])).unwrap();
        let first = chain.validate();
        let second = chain.validate();
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn tampered_data_cascades() {
        let mut chain = Blockchain::new(2).unwrap();
        chain.add_block(json!({"note": "x"})).unwrap();
        chain.add_block(json!({"note": "y"})).unwrap();
        chain.chain[1].data = json!({"note": "forged"});

        let report = chain.validate();
        assert!(!report.is_valid);
        assert_eq!(report.invalid_block_indices, vec![1]);

        let d1 = &report.details[1];
        assert!(!d1.is_hash_valid);
        assert!(!d1.block_valid);
        assert!(!d1.cascaded);

        // Block 2's fields are untouched, yet it is invalid by inheritance.
        let d2 = &report.details[2];
        assert!(d2.cascaded);
        assert!(!d2.block_valid);
        assert!(d2.is_hash_valid);
        assert!(d2.is_pow_valid);
        assert!(d2.is_index_valid);
        // Its stored pointer no longer matches the tampered predecessor's
        // recomputed hash.
        assert!(!d2.is_prev_valid);
    }

    #[test]
    fn tampering_any_single_field_is_detected() {
        let mut base = Blockchain::new(2).unwrap();
        base.add_block(json!("a")).unwrap();
        base.add_block(json!("b")).unwrap();

        for field in ["index", "timestamp", "data", "previous_hash", "nonce"] {
            let mut chain = base.clone();
            let block = &mut chain.chain[1];
            match field {
                "index" => block.index += 1,
                "timestamp" => block.timestamp.push('Z'),
                "data" => block.data = json!("c"),
                "previous_hash" => block.previous_hash.push('0'),
                _ => block.nonce += 1,
            }
            let report = chain.validate();
            assert!(!report.is_valid, "tampered {field} went undetected");
            assert!(!report.details[1].is_hash_valid);
            assert!(report.details[2].cascaded);
        }
    }

    #[test]
    fn forged_previous_hash_pointer_is_caught() {
        let mut chain = Blockchain::new(2).unwrap();
        chain.add_block(json!("a")).unwrap();
        chain.add_block(json!("b")).unwrap();
        // Repoint block 2 at a bogus predecessor and re-mine it so its own
        // hash and proof-of-work are self-consistent again.
        let block = &mut chain.chain[2];
        block.previous_hash = "00".to_string() + &"e".repeat(62);
        block.nonce = 0;
        pow::mine(block, 2, None).unwrap();

        let report = chain.validate();
        assert!(!report.is_valid);
        assert_eq!(report.invalid_block_indices, vec![2]);
        let d2 = &report.details[2];
        assert!(d2.is_hash_valid);
        assert!(d2.is_pow_valid);
        assert!(!d2.is_prev_valid);
    }

    #[test]
    fn external_chain_roundtrips_through_records() {
        let mut chain = Blockchain::new(2).unwrap();
        chain.add_block(json!({"amount": 5})).unwrap();
        let records: Vec<Value> = chain
            .blocks()
            .iter()
            .map(|b| serde_json::to_value(b).unwrap())
            .collect();
        let report =
            validate_external_chain(&records, chain.difficulty(), Some(chain.genesis_hash()));
        assert!(report.is_valid);
        assert_eq!(report.details[0].matches_server_genesis, Some(true));
        assert_eq!(report.details[1].matches_server_genesis, Some(true));
    }

    #[test]
    fn foreign_genesis_is_flagged_without_cascading() {
        // Two chains mined independently: same rules, different origin.
        let server = Blockchain::new(2).unwrap();
        let mut foreign = Blockchain::new(2).unwrap();
        foreign.add_block(json!("from elsewhere")).unwrap();
        assert_ne!(server.genesis_hash(), foreign.genesis_hash());

        let records: Vec<Value> = foreign
            .blocks()
            .iter()
            .map(|b| serde_json::to_value(b).unwrap())
            .collect();
        let report = validate_external_chain(&records, 2, Some(server.genesis_hash()));

        let d0 = &report.details[0];
        assert_eq!(d0.matches_server_genesis, Some(false));
        assert!(!d0.block_valid);
        // The block itself is internally sound; only its origin differs.
        assert!(d0.is_hash_valid && d0.is_pow_valid && d0.is_prev_valid && d0.is_index_valid);
        assert_eq!(report.invalid_block_indices, vec![0]);

        // Origin mismatch does not cascade into the descendants.
        let d1 = &report.details[1];
        assert!(!d1.cascaded);
        assert!(d1.block_valid);
        assert!(!report.is_valid);
    }

    #[test]
    fn validation_timestamps_are_opaque() {
        // Only presence matters: a strange but untampered timestamp string
        // still validates.
        let mut block = fixed_block(0, json!("t"), GENESIS_PREV_HASH);
        block.timestamp = "not-a-date".into();
        block.hash = block.compute_hash();
        pow::mine(&mut block, 2, None).unwrap();
        let report = validate_external_chain(
            &[serde_json::to_value(&block).unwrap()],
            2,
            None,
        );
        assert!(report.is_valid);
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let block = fixed_block(0, json!(null), GENESIS_PREV_HASH);
        let value = serde_json::to_value(&block).unwrap();
        assert!(value.get("previousHash").is_some());
        assert!(value.get("previous_hash").is_none());
    }
}
