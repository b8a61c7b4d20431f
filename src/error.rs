//! Error types for hashvault

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("invalid exponent k={0} (must be between 1 and 40)")]
    InvalidExponent(u32),

    #[error("worker count must be positive")]
    InvalidWorkers,

    #[error("memory budget must be positive")]
    InvalidMemoryBudget,

    #[error("unsupported difficulty {0} (must be 3 or 4)")]
    InvalidDifficulty(usize),

    #[error("generation task must produce at least one record")]
    EmptyBatch,

    #[error("file size {len} is not a multiple of 16 bytes")]
    Misaligned { len: u64 },

    #[error("file size mismatch: expected {expected} bytes for k={k}, got {actual}")]
    SizeMismatch { k: u32, expected: u64, actual: u64 },

    #[error("records out of order at index {index}")]
    OrderingViolation { index: u64 },

    #[error("digest does not match nonce at index {index}")]
    DigestMismatch { index: u64 },

    #[error("index out of bounds: {index} >= {len}")]
    OutOfBounds { index: u64, len: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Coarse classification used for process exit statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Format,
    Unsorted,
    /// Sorted, but a stored digest does not match its nonce
    Corrupt,
    Bounds,
    Io,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Io | ErrorKind::Bounds => 1,
            ErrorKind::Config => 2,
            ErrorKind::Format => 3,
            ErrorKind::Unsorted => 4,
            ErrorKind::Corrupt => 5,
        }
    }
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::InvalidExponent(_)
            | VaultError::InvalidWorkers
            | VaultError::InvalidMemoryBudget
            | VaultError::InvalidDifficulty(_)
            | VaultError::EmptyBatch => ErrorKind::Config,
            VaultError::Misaligned { .. } | VaultError::SizeMismatch { .. } => ErrorKind::Format,
            VaultError::OrderingViolation { .. } => ErrorKind::Unsorted,
            VaultError::DigestMismatch { .. } => ErrorKind::Corrupt,
            VaultError::OutOfBounds { .. } => ErrorKind::Bounds,
            VaultError::Io(_) | VaultError::Pool(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
