//! Sorted run spilling for the external regime
//!
//! Runs live in a private temporary directory next to the final output (same
//! filesystem, so spilling never crosses devices). The directory and any
//! leftover runs are removed when the spiller is dropped.
//!
//! When there are more runs than the merge fan-in allows, groups of runs are
//! merged into larger intermediate runs inside the same directory until a
//! single final pass fits.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::{merge, sort_in_memory};
use crate::error::Result;
use crate::record::Record;

const RUN_WRITE_BUFFER: usize = 8 * 1024 * 1024;

pub struct RunSpiller {
    dir: TempDir,
    runs: Vec<PathBuf>,
    records: u64,
    max_fan_in: usize,
}

impl RunSpiller {
    /// Spill directory inside `dir`
    pub fn new_in(dir: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("vaultx-runs-")
            .tempdir_in(dir)?;
        Ok(Self {
            dir,
            runs: Vec::new(),
            records: 0,
            max_fan_in: merge::MAX_FAN_IN,
        })
    }

    /// Limit how many runs a single merge pass opens (at least 2)
    pub fn with_max_fan_in(mut self, max_fan_in: usize) -> Self {
        self.max_fan_in = max_fan_in.max(merge::MIN_FAN_IN);
        self
    }

    /// Fan-in for a memory budget, see [`merge::max_fan_in`]
    pub fn with_budget(self, budget_bytes: u64) -> Self {
        self.with_max_fan_in(merge::max_fan_in(budget_bytes))
    }

    pub fn max_fan_in(&self) -> usize {
        self.max_fan_in
    }

    /// Spill directory beside `output`
    pub fn for_output(output: &Path) -> Result<Self> {
        match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Self::new_in(parent),
            _ => Self::new_in(Path::new(".")),
        }
    }

    /// Sort `records` and write them as one run
    pub fn spill(&mut self, records: &mut [Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        sort_in_memory(records);

        let run_path = self.dir.path().join(format!("run_{}.bin", self.runs.len()));
        let mut writer = BufWriter::with_capacity(RUN_WRITE_BUFFER, File::create(&run_path)?);
        for record in records.iter() {
            writer.write_all(record.as_bytes())?;
        }
        writer.flush()?;

        tracing::debug!(
            run = self.runs.len(),
            records = records.len(),
            "Spilled sorted run"
        );
        self.records += records.len() as u64;
        self.runs.push(run_path);
        Ok(())
    }

    pub fn runs(&self) -> &[PathBuf] {
        &self.runs
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Merge every run into `output`; consumes the spiller and its directory
    pub fn merge_into(mut self, output: &Path) -> Result<u64> {
        let mut pass = 0usize;
        while self.runs.len() > self.max_fan_in {
            self.runs = self.merge_pass(pass)?;
            pass += 1;
        }
        let merged = merge::merge_runs(&self.runs, output)?;
        debug_assert_eq!(merged, self.records);
        Ok(merged)
    }

    /// Merge groups of `max_fan_in` runs into intermediate runs
    fn merge_pass(&self, pass: usize) -> Result<Vec<PathBuf>> {
        let groups = self.runs.chunks(self.max_fan_in);
        tracing::debug!(
            pass,
            runs = self.runs.len(),
            groups = groups.len(),
            "Intermediate merge pass"
        );
        let mut next = Vec::with_capacity(groups.len());
        for (i, group) in groups.enumerate() {
            let path = self.dir.path().join(format!("pass{pass}_run_{i}.bin"));
            merge::merge_runs(group, &path)?;
            next.push(path);
        }
        Ok(next)
    }
}
