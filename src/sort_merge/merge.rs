//! K-way merge of sorted runs
//!
//! Keeps one buffered reader and one current record per run; a min-heap keyed
//! by `(record, run index)` picks the next output record. Memory use is one
//! read buffer per run plus the output buffer, so callers bound the number of
//! runs merged at once with [`max_fan_in`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::Result;
use crate::record::{Record, RECORD_SIZE};
use crate::vault_file::AtomicRecordWriter;

pub const RUN_READ_BUFFER: usize = 1024 * 1024;
/// Fewest runs a merge pass takes, whatever the budget
pub const MIN_FAN_IN: usize = 2;
/// Upper bound on open runs per pass (keeps well under common descriptor limits)
pub const MAX_FAN_IN: usize = 512;

/// Number of runs one merge pass may open under `budget_bytes` of read buffers
pub fn max_fan_in(budget_bytes: u64) -> usize {
    let by_budget = usize::try_from(budget_bytes / RUN_READ_BUFFER as u64).unwrap_or(usize::MAX);
    by_budget.clamp(MIN_FAN_IN, MAX_FAN_IN)
}

struct RunReader {
    reader: BufReader<File>,
    current: Option<Record>,
}

impl RunReader {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = Self {
            reader: BufReader::with_capacity(RUN_READ_BUFFER, file),
            current: None,
        };
        reader.read_next()?;
        Ok(reader)
    }

    fn read_next(&mut self) -> Result<()> {
        let mut buf = [0u8; RECORD_SIZE];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {
                self.current = Some(Record::from_bytes(buf));
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.current = None;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Merge sorted run files into `output`; returns the number of records written
///
/// Run files are deleted as soon as they are exhausted.
pub fn merge_runs(runs: &[PathBuf], output: &Path) -> Result<u64> {
    let start_time = Instant::now();
    tracing::info!(runs = runs.len(), output = %output.display(), "Merging sorted runs");

    let mut readers = Vec::with_capacity(runs.len());
    let mut heap = BinaryHeap::with_capacity(runs.len());
    for (idx, run) in runs.iter().enumerate() {
        let reader = RunReader::open(run)?;
        if let Some(record) = reader.current {
            heap.push(Reverse((record, idx)));
        }
        readers.push(reader);
    }

    let mut writer = AtomicRecordWriter::create(output)?;
    while let Some(Reverse((record, idx))) = heap.pop() {
        writer.write_record(&record)?;

        let reader = &mut readers[idx];
        reader.read_next()?;
        match reader.current {
            Some(next) => heap.push(Reverse((next, idx))),
            None => {
                if let Err(e) = std::fs::remove_file(&runs[idx]) {
                    tracing::warn!(run = %runs[idx].display(), error = %e, "Failed to delete exhausted run");
                }
            }
        }
    }

    let merged = writer.finish()?;
    tracing::info!(
        records = merged,
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "Merge complete"
    );
    Ok(merged)
}
