//! hashvault - hash-record vault generation, sorting and prefix search
//!
//! A vault is a flat file of `2^k` 16-byte records (`digest(10) || nonce(6)`)
//! sorted by full-record byte order. This crate generates the records in
//! parallel from per-batch seeds, sorts them (in memory or with an external
//! merge sort under a memory budget), writes the vault atomically, verifies
//! sortedness and runs digest-prefix binary searches against it.

pub mod config;
pub mod error;
/// Record layout and ordering
pub mod record;

/// Work partitioning and batch generation
pub mod generator;
pub mod partition;

/// Sort engine (in-memory and external merge sort)
pub mod sort_merge;

pub mod pipeline;
pub mod search;
pub mod vault_file;
pub mod verify;

pub use config::{GenerateConfig, SearchConfig};
pub use error::{ErrorKind, Result, VaultError};
pub use pipeline::{generate_vault, GenerateReport};
pub use record::Record;
pub use search::{prefix_range, prefix_search, run_searches, Query, SearchOutcome};
pub use vault_file::{read_all, read_at, write_records, RecordSource, VaultFile};
pub use verify::{verify_file, VerifyOptions, VerifyReport};
