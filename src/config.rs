//! Typed run configuration
//!
//! The CLI fills these from flags / `VAULTX_*` environment variables; the
//! library validates them before any work is attempted.

use serde::Serialize;

use crate::error::{Result, VaultError};
use crate::record::RECORD_SIZE;

pub const MIN_EXPONENT: u32 = 1;
pub const MAX_EXPONENT: u32 = 40;

/// Default memory ceiling before the sort spills to disk (MiB)
pub const DEFAULT_MEMORY_MB: u64 = 256;

pub const SUPPORTED_DIFFICULTIES: [usize; 2] = [3, 4];

/// Validate `k` and return `2^k`
pub fn total_records(k: u32) -> Result<u64> {
    if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&k) {
        return Err(VaultError::InvalidExponent(k));
    }
    Ok(1u64 << k)
}

/// Expected vault file size for `k`
pub fn expected_file_size(k: u32) -> Result<u64> {
    Ok(total_records(k)? * RECORD_SIZE as u64)
}

pub fn validate_difficulty(difficulty: usize) -> Result<usize> {
    if SUPPORTED_DIFFICULTIES.contains(&difficulty) {
        Ok(difficulty)
    } else {
        Err(VaultError::InvalidDifficulty(difficulty))
    }
}

/// Settings for one generate-sort-write run
#[derive(Debug, Clone, Serialize)]
pub struct GenerateConfig {
    /// log2 of the record count
    pub k: u32,
    pub workers: usize,
    pub memory_budget_mb: u64,
    /// Master seed; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl GenerateConfig {
    pub fn new(k: u32, workers: usize) -> Self {
        Self {
            k,
            workers,
            memory_budget_mb: DEFAULT_MEMORY_MB,
            seed: None,
        }
    }

    pub fn with_memory_budget_mb(mut self, memory_budget_mb: u64) -> Self {
        self.memory_budget_mb = memory_budget_mb;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        total_records(self.k)?;
        if self.workers == 0 {
            return Err(VaultError::InvalidWorkers);
        }
        if self.memory_budget_mb == 0 {
            return Err(VaultError::InvalidMemoryBudget);
        }
        Ok(())
    }

    pub fn total_records(&self) -> Result<u64> {
        total_records(self.k)
    }

    pub fn memory_budget_bytes(&self) -> u64 {
        self.memory_budget_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self::new(26, num_cpus::get())
    }
}

/// Settings for a batch of random prefix searches
#[derive(Debug, Clone, Serialize)]
pub struct SearchConfig {
    pub queries: usize,
    pub difficulty: usize,
    pub seed: Option<u64>,
}

impl SearchConfig {
    pub fn new(queries: usize, difficulty: usize) -> Self {
        Self {
            queries,
            difficulty,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_difficulty(self.difficulty)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_records_bounds() {
        assert_eq!(total_records(4).unwrap(), 16);
        assert_eq!(expected_file_size(4).unwrap(), 256);
        assert!(matches!(
            total_records(0),
            Err(VaultError::InvalidExponent(0))
        ));
        assert!(matches!(
            total_records(MAX_EXPONENT + 1),
            Err(VaultError::InvalidExponent(_))
        ));
    }

    #[test]
    fn test_generate_config_validation() {
        assert!(GenerateConfig::new(10, 4).validate().is_ok());
        assert!(matches!(
            GenerateConfig::new(10, 0).validate(),
            Err(VaultError::InvalidWorkers)
        ));
        assert!(matches!(
            GenerateConfig::new(10, 2).with_memory_budget_mb(0).validate(),
            Err(VaultError::InvalidMemoryBudget)
        ));
    }

    #[test]
    fn test_difficulty_validation() {
        assert!(SearchConfig::new(10, 3).validate().is_ok());
        assert!(SearchConfig::new(10, 4).validate().is_ok());
        assert!(matches!(
            SearchConfig::new(10, 2).validate(),
            Err(VaultError::InvalidDifficulty(2))
        ));
        assert!(matches!(
            validate_difficulty(5),
            Err(VaultError::InvalidDifficulty(5))
        ));
    }
}
