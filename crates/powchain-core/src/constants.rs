pub const HASH_HEX_SIZE: usize = 64;
pub const GENESIS_PREV_HASH: &str = "0";
pub const GENESIS_PAYLOAD: &str = "Genesis Block";
pub const DEFAULT_DIFFICULTY: usize = 3;
