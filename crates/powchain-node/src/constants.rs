pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_NONCE_LIMIT: u64 = 50_000_000;
