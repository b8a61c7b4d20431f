//! Record generation
//!
//! Work is cut into batches, each a pure function of `(count, seed)`: every
//! batch seeds its own RNG, so batches share no mutable state and produce the
//! same records for the same seed no matter which worker runs them. Batches
//! run on a fixed-size rayon pool; arrival order does not matter because the
//! sort stage reorders everything.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Result, VaultError};
use crate::record::{Nonce, Record, NONCE_SIZE};

/// Smallest batch handed to a worker
pub const MIN_BATCH_SIZE: u64 = 1000;
/// Target number of batches per worker, for load balancing on the work-stealing pool
pub const BATCHES_PER_WORKER: u64 = 100;

/// One unit of generation work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationTask {
    count: u64,
    seed: u64,
}

impl GenerationTask {
    /// A zero count is rejected rather than treated as a no-op.
    pub fn new(count: u64, seed: u64) -> Result<Self> {
        if count == 0 {
            return Err(VaultError::EmptyBatch);
        }
        Ok(Self { count, seed })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Splits a record total into batches of (nearly) equal size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    total: u64,
    batch_size: u64,
}

impl BatchPlan {
    /// Batch size is `max(1000, total / (workers * 100))`
    pub fn new(total: u64, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(VaultError::InvalidWorkers);
        }
        let target_batches = (workers as u64).saturating_mul(BATCHES_PER_WORKER);
        let batch_size = (total / target_batches).max(MIN_BATCH_SIZE);
        Ok(Self { total, batch_size })
    }

    /// Cap the batch size (the external sort keeps every batch within one run)
    pub fn with_max_batch(mut self, max_batch: u64) -> Self {
        self.batch_size = self.batch_size.min(max_batch.max(1));
        self
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn batch_count(&self) -> u64 {
        self.total.div_ceil(self.batch_size)
    }

    /// Materialize the tasks, drawing one seed per batch from the master RNG
    pub fn tasks(&self, master_seed: Option<u64>) -> Vec<GenerationTask> {
        let mut master = master_rng(master_seed);
        let mut remaining = self.total;
        let mut tasks = Vec::with_capacity(self.batch_count() as usize);
        while remaining > 0 {
            let count = remaining.min(self.batch_size);
            tasks.push(GenerationTask {
                count,
                seed: master.gen(),
            });
            remaining -= count;
        }
        tasks
    }
}

/// Build tasks from per-worker shares (see `partition::split_total`).
/// Zero shares produce no task.
pub fn tasks_from_counts(counts: &[u64], master_seed: Option<u64>) -> Vec<GenerationTask> {
    let mut master = master_rng(master_seed);
    counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| GenerationTask {
            count,
            seed: master.gen(),
        })
        .collect()
}

fn master_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Produce one batch: each nonce is 6 uniform bytes from the batch's own RNG
pub fn generate_batch(task: &GenerationTask) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(task.seed);
    let mut records = Vec::with_capacity(task.count as usize);
    let mut nonce: Nonce = [0u8; NONCE_SIZE];
    for _ in 0..task.count {
        rng.fill_bytes(&mut nonce);
        records.push(Record::from_nonce(nonce));
    }
    records
}

/// Fixed-size worker pool for batch generation
pub struct Generator {
    pool: ThreadPool,
    workers: usize,
}

impl Generator {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(VaultError::InvalidWorkers);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("vaultx-gen-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run all tasks in parallel and collect their records
    pub fn run(&self, tasks: &[GenerationTask]) -> Vec<Record> {
        let total: u64 = tasks.iter().map(GenerationTask::count).sum();
        let mut records = Vec::with_capacity(total as usize);
        self.pool.install(|| {
            records.par_extend(tasks.par_iter().flat_map_iter(generate_batch));
        });
        records
    }

    /// Run a closure inside the generator's pool (used to sort on the same threads)
    pub fn install<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(f)
    }
}
