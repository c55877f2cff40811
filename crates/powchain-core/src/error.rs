use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("mining failed: exhausted {limit} nonce attempts at difficulty {difficulty}")]
    MiningExhausted { difficulty: usize, limit: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
