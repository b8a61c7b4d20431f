//! Sortedness verifier
//!
//! Streams a vault file with a constant working set and stops at the first
//! record that is smaller than its predecessor.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::error::{Result, VaultError};
use crate::record::Record;
use crate::vault_file::VaultFile;

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Also require `digest == hash(nonce)` for every record
    pub check_digests: bool,
    /// Require exactly `2^k` records
    pub expect_k: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub records: u64,
    pub bytes: u64,
    pub digests_checked: bool,
    pub elapsed_secs: f64,
    pub read_mb_per_sec: f64,
}

/// Check a record sequence; returns the record count
///
/// Fails with `OrderingViolation { index }` where `record[index] < record[index - 1]`,
/// or `DigestMismatch { index }` when digest checking is on.
pub fn verify_records<I>(records: I, check_digests: bool) -> Result<u64>
where
    I: IntoIterator<Item = Result<Record>>,
{
    let mut prev: Option<Record> = None;
    let mut count = 0u64;
    for record in records {
        let record = record?;
        if check_digests && !record.is_consistent() {
            return Err(VaultError::DigestMismatch { index: count });
        }
        if matches!(prev, Some(p) if record < p) {
            return Err(VaultError::OrderingViolation { index: count });
        }
        prev = Some(record);
        count += 1;
    }
    Ok(count)
}

/// Verify a vault file on disk
pub fn verify_file(path: &Path, options: VerifyOptions) -> Result<VerifyReport> {
    let vault = VaultFile::open(path)?;
    if let Some(k) = options.expect_k {
        vault.expect_exponent(k)?;
    }

    tracing::info!(
        file = %path.display(),
        records = vault.records(),
        check_digests = options.check_digests,
        "Verifying vault file"
    );

    let start_time = Instant::now();
    let records = verify_records(vault.stream()?, options.check_digests)?;
    let elapsed = start_time.elapsed().as_secs_f64();
    let mb = vault.size_bytes() as f64 / (1024.0 * 1024.0);

    Ok(VerifyReport {
        records,
        bytes: vault.size_bytes(),
        digests_checked: options.check_digests,
        elapsed_secs: elapsed,
        read_mb_per_sec: if elapsed > 0.0 { mb / elapsed } else { 0.0 },
    })
}
