//! Record sort engine
//!
//! Two regimes, chosen by a memory budget:
//!
//! - **In-memory**: when `records * 16 <= budget`, the whole set is sorted with
//!   rayon's parallel unstable sort.
//! - **External**: otherwise records are cut into runs of at most
//!   `budget / 16` records, each run is sorted in memory and spilled to a
//!   temporary directory, and a k-way merge streams the runs into the output.
//!   The merge opens at most `budget / 1 MiB` runs at a time (between 2 and
//!   512) and merges in several passes when there are more.
//!
//! Both regimes produce the full 16-byte unsigned lexicographic order. Ties
//! are byte-identical records, so their relative order is irrelevant.

pub mod merge;
pub mod runs;

pub use merge::merge_runs;
pub use runs::RunSpiller;

use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::record::{Record, RECORD_SIZE};
use crate::vault_file::{self, VaultFile};

/// Sort regime for a given record count and memory budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SortStrategy {
    InMemory,
    External { run_records: u64 },
}

impl SortStrategy {
    pub fn for_budget(total_records: u64, budget_bytes: u64) -> Self {
        let total_bytes = total_records.saturating_mul(RECORD_SIZE as u64);
        if total_bytes <= budget_bytes {
            SortStrategy::InMemory
        } else {
            SortStrategy::External {
                run_records: (budget_bytes / RECORD_SIZE as u64).max(1),
            }
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, SortStrategy::External { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SortStrategy::InMemory => "in-memory",
            SortStrategy::External { .. } => "external",
        }
    }
}

/// Sort in place by the full record order
pub fn sort_in_memory(records: &mut [Record]) {
    records.par_sort_unstable();
}

pub fn is_sorted(records: &[Record]) -> bool {
    records.windows(2).all(|w| w[0] <= w[1])
}

/// Sort an existing unsorted vault file into `output`
///
/// Returns the number of records written.
pub fn sort_file(input: &Path, output: &Path, budget_bytes: u64) -> Result<u64> {
    let start_time = Instant::now();
    let vault = VaultFile::open(input)?;
    let strategy = SortStrategy::for_budget(vault.records(), budget_bytes);

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        records = vault.records(),
        strategy = strategy.name(),
        "Sorting vault file"
    );

    let written = match strategy {
        SortStrategy::InMemory => {
            let mut records: Vec<Record> = vault.stream()?.collect::<Result<_>>()?;
            sort_in_memory(&mut records);
            vault_file::write_records(output, &records)?
        }
        SortStrategy::External { run_records } => {
            let mut spiller = RunSpiller::for_output(output)?.with_budget(budget_bytes);
            let mut stream = vault.stream()?;
            loop {
                let mut chunk: Vec<Record> = stream
                    .by_ref()
                    .take(run_records as usize)
                    .collect::<Result<_>>()?;
                if chunk.is_empty() {
                    break;
                }
                spiller.spill(&mut chunk)?;
            }
            spiller.merge_into(output)?
        }
    };

    tracing::info!(
        records = written,
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "Sort complete"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{generate_batch, GenerationTask};

    #[test]
    fn test_strategy_switches_at_budget() {
        assert_eq!(SortStrategy::for_budget(16, 256), SortStrategy::InMemory);
        assert_eq!(
            SortStrategy::for_budget(17, 256),
            SortStrategy::External { run_records: 16 }
        );
        assert_eq!(
            SortStrategy::for_budget(10, 3),
            SortStrategy::External { run_records: 1 }
        );
    }

    #[test]
    fn test_sort_in_memory() {
        let mut records = generate_batch(&GenerationTask::new(2000, 1).unwrap());
        assert!(!is_sorted(&records));
        sort_in_memory(&mut records);
        assert!(is_sorted(&records));
    }

    #[test]
    fn test_external_sort_with_many_runs_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("unsorted.bin");
        let records = generate_batch(&GenerationTask::new(2000, 12).unwrap());
        vault_file::write_records(&input, &records).unwrap();

        // 20 records per run -> 100 runs, merged two at a time
        let budget = 16 * 20;
        assert_eq!(merge::max_fan_in(budget), merge::MIN_FAN_IN);
        let external = dir.path().join("external.bin");
        assert_eq!(sort_file(&input, &external, budget).unwrap(), 2000);

        let mut expected = records;
        sort_in_memory(&mut expected);
        let in_memory = dir.path().join("in_memory.bin");
        vault_file::write_records(&in_memory, &expected).unwrap();
        assert_eq!(
            std::fs::read(&external).unwrap(),
            std::fs::read(&in_memory).unwrap()
        );
        // only input and the two outputs remain
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_sort_file_both_regimes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("unsorted.bin");
        let records = generate_batch(&GenerationTask::new(1000, 5).unwrap());
        vault_file::write_records(&input, &records).unwrap();

        let in_memory = dir.path().join("a.bin");
        let external = dir.path().join("b.bin");
        assert_eq!(sort_file(&input, &in_memory, 1 << 20).unwrap(), 1000);
        // 100 records per run -> 10 runs
        assert_eq!(sort_file(&input, &external, 1600).unwrap(), 1000);

        let a = std::fs::read(&in_memory).unwrap();
        let b = std::fs::read(&external).unwrap();
        assert_eq!(a, b);

        let mut expected = records;
        expected.sort();
        assert!(is_sorted(&expected));
        let sorted: Vec<Record> = vault_file::read_all(&external)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(sorted, expected);
    }
}
