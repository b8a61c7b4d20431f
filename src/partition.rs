//! Work partitioner
//!
//! Splits `2^k` records into `parts` shares as evenly as possible; the first
//! `2^k mod parts` shares carry one extra record.

use crate::config;
use crate::error::{Result, VaultError};

pub fn split_total(k: u32, parts: usize) -> Result<Vec<u64>> {
    let total = config::total_records(k)?;
    split_count(total, parts)
}

/// Same split for an arbitrary total
pub fn split_count(total: u64, parts: usize) -> Result<Vec<u64>> {
    if parts == 0 {
        return Err(VaultError::InvalidWorkers);
    }
    let parts_u64 = parts as u64;
    let base = total / parts_u64;
    let extra = total % parts_u64;
    Ok((0..parts_u64)
        .map(|i| base + u64::from(i < extra))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_k10_three_workers() {
        let counts = split_total(10, 3).unwrap();
        assert_eq!(counts, vec![342, 341, 341]);
        assert_eq!(counts.iter().sum::<u64>(), 1024);
    }

    #[test]
    fn test_split_even() {
        assert_eq!(split_total(4, 4).unwrap(), vec![4, 4, 4, 4]);
    }

    #[test]
    fn test_more_parts_than_records() {
        let counts = split_count(2, 4).unwrap();
        assert_eq!(counts, vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_zero_parts_rejected() {
        assert!(matches!(split_total(4, 0), Err(VaultError::InvalidWorkers)));
    }
}
