//! vaultx CLI tool
//!
//! Command-line interface for generating, verifying and searching vaults
//!
//! Usage:
//!   vaultx generate -k 26 -f vault.bin -t 8 -m 256
//!   vaultx verify -f vault.bin [-k 26] [--check-digests]
//!   vaultx search -f vault.bin -k 26 -s 1000 -q 3
//!   vaultx print -f vault.bin -n 10
//!   vaultx sort -i unsorted.bin -f vault.bin -m 256
//!   vaultx partition -k 10 -w 3
//!
//! Exit status: 0 success, 1 I/O error, 2 invalid configuration,
//! 3 file format error, 4 file not sorted, 5 digest does not match nonce.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use hashvault::config::{self, GenerateConfig, SearchConfig, DEFAULT_MEMORY_MB};
use hashvault::vault_file::{RecordSource, VaultFile};
use hashvault::{partition, pipeline, search, sort_merge, verify, VaultError};

#[derive(Parser)]
#[command(name = "vaultx")]
#[command(about = "Generate, sort, verify and search hash-record vaults")]
struct Cli {
    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate 2^k records, sort them and write the vault
    Generate {
        /// log2 of the record count
        #[arg(short, long, env = "VAULTX_K")]
        k: u32,
        /// Output vault file
        #[arg(short, long, env = "VAULTX_FILE")]
        file: PathBuf,
        /// Worker threads (defaults to logical cores)
        #[arg(short = 't', long, env = "VAULTX_WORKERS")]
        workers: Option<usize>,
        /// Memory budget in MiB before sorting spills to disk
        #[arg(short, long, env = "VAULTX_MEMORY_MB", default_value_t = DEFAULT_MEMORY_MB)]
        memory: u64,
        /// Master seed for reproducible output
        #[arg(long, env = "VAULTX_SEED")]
        seed: Option<u64>,
    },
    /// Check that a vault is sorted
    Verify {
        #[arg(short, long, env = "VAULTX_FILE")]
        file: PathBuf,
        /// Require exactly 2^k records
        #[arg(short, long)]
        k: Option<u32>,
        /// Also check digest == BLAKE3(nonce)[..10] for every record
        #[arg(long)]
        check_digests: bool,
    },
    /// Run random prefix searches against a vault
    Search {
        #[arg(short, long, env = "VAULTX_FILE")]
        file: PathBuf,
        /// log2 of the record count the vault must hold
        #[arg(short, long, env = "VAULTX_K")]
        k: u32,
        /// Number of searches
        #[arg(short, long, default_value_t = 1000)]
        searches: usize,
        /// Prefix length in bytes (3 or 4)
        #[arg(short = 'q', long, env = "VAULTX_DIFFICULTY", default_value_t = 3)]
        difficulty: usize,
        #[arg(long, env = "VAULTX_SEED")]
        seed: Option<u64>,
        /// Read through seeks instead of a memory map
        #[arg(long)]
        no_mmap: bool,
        /// Print one line per query
        #[arg(long)]
        each: bool,
    },
    /// Look up one hex prefix and report every matching index
    Lookup {
        #[arg(short, long, env = "VAULTX_FILE")]
        file: PathBuf,
        /// Hex prefix of 3 or 4 bytes
        prefix: String,
    },
    /// Print the first N records
    Print {
        #[arg(short, long, env = "VAULTX_FILE")]
        file: PathBuf,
        #[arg(short = 'n', long, default_value_t = 10)]
        count: u64,
    },
    /// Sort an existing unsorted record file
    Sort {
        /// Unsorted input file
        #[arg(short, long)]
        input: PathBuf,
        /// Sorted output file
        #[arg(short, long, env = "VAULTX_FILE")]
        file: PathBuf,
        #[arg(short, long, env = "VAULTX_MEMORY_MB", default_value_t = DEFAULT_MEMORY_MB)]
        memory: u64,
    },
    /// Show how 2^k records split across workers
    Partition {
        #[arg(short, long, env = "VAULTX_K")]
        k: u32,
        #[arg(short, long, env = "VAULTX_WORKERS")]
        workers: usize,
    },
}

fn main() -> ExitCode {
    // Optional .env for VAULTX_* settings
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("❌ {err:#}");
            let code = err
                .downcast_ref::<VaultError>()
                .map(|e| e.kind().exit_code())
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn emit<T: Serialize>(json: bool, report: &T, text: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        text(report);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Generate {
            k,
            file,
            workers,
            memory,
            seed,
        } => {
            let mut config = GenerateConfig::new(k, workers.unwrap_or_else(num_cpus::get))
                .with_memory_budget_mb(memory);
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }
            let report = pipeline::generate_vault(&config, &file)
                .with_context(|| format!("Failed to generate {}", file.display()))?;
            emit(json, &report, |r| {
                println!("{}", "═".repeat(60));
                println!("  ✅ Vault written: {}", file.display());
                println!("  Records: {} (k={})", r.records, r.k);
                println!("  Workers: {}  Batches: {} x {}", r.workers, r.batches, r.batch_size);
                println!("  Sort: {} ({} runs)", r.strategy.name(), r.runs);
                println!("  File size: {} bytes", r.file_size);
                println!(
                    "  Time: gen {:.3}s  sort {:.3}s  write {:.3}s  total {:.3}s",
                    r.generate_secs, r.sort_secs, r.write_secs, r.total_secs
                );
                println!("  Rate: {:.2} MH/s  {:.2} MB/s", r.mhashes_per_sec, r.mb_per_sec);
            })?;
        }
        Commands::Verify {
            file,
            k,
            check_digests,
        } => {
            let options = verify::VerifyOptions {
                check_digests,
                expect_k: k,
            };
            let report = verify::verify_file(&file, options)
                .with_context(|| format!("Verification of {} failed", file.display()))?;
            emit(json, &report, |r| {
                println!(
                    "✅ verify: OK {} records ({} bytes) read_MBps={:.2}",
                    r.records, r.bytes, r.read_mb_per_sec
                );
            })?;
        }
        Commands::Search {
            file,
            k,
            searches,
            difficulty,
            seed,
            no_mmap,
            each,
        } => {
            let mut search_config = SearchConfig::new(searches, difficulty);
            if let Some(seed) = seed {
                search_config = search_config.with_seed(seed);
            }
            search_config.validate()?;
            let vault = VaultFile::open_with_exponent(&file, k)
                .with_context(|| format!("Cannot search {}", file.display()))?;

            let summary = if no_mmap {
                search::run_searches(&mut vault.seek_reader()?, &search_config)?
            } else {
                search::run_searches(&mut vault.mapped()?, &search_config)?
            };
            emit(json, &summary, |s| {
                if each {
                    for (i, r) in s.results.iter().enumerate() {
                        match r.found {
                            Some(idx) => println!("[{i}] {} MATCH at {idx} (comps={})", r.query, r.comparisons),
                            None => println!("[{i}] {} NOTFOUND (comps={})", r.query, r.comparisons),
                        }
                    }
                }
                println!("Search Summary:");
                println!("  Records: {}  Difficulty: {}", s.records, s.difficulty);
                println!("  Total searches: {}", s.searches);
                println!("  Found: {}", s.found);
                println!("  Not found: {}", s.not_found);
                println!("  Total time: {:.6} s", s.total_secs);
                println!("  Avg time: {:.3} ms", s.avg_ms);
                println!("  Throughput: {:.2} searches/sec", s.searches_per_sec);
                println!("  Total comparisons: {}", s.total_comparisons);
                println!("  Avg comparisons: {:.2}", s.avg_comparisons);
            })?;
        }
        Commands::Lookup { file, prefix } => {
            let bytes = hex::decode(&prefix).context("Prefix must be hex")?;
            let query = search::Query::new(&bytes)?;
            let mut source = VaultFile::open(&file)?.mapped()?;
            let outcome = search::prefix_search(&mut source, &query)?;
            let range = search::prefix_range(&mut source, &query)?;
            emit(json, &(outcome, range), |(o, r)| {
                match o.found {
                    Some(idx) => println!("{query} MATCH at {idx} (comps={})", o.comparisons),
                    None => println!("{query} NOTFOUND (comps={})", o.comparisons),
                }
                println!(
                    "  matching range: [{}, {}) = {} records (comps={})",
                    r.start,
                    r.end,
                    r.len(),
                    r.comparisons
                );
            })?;
        }
        Commands::Print { file, count } => {
            let vault = VaultFile::open(&file)?;
            let mut source = vault.seek_reader()?;
            for index in 0..count.min(source.len()) {
                println!("{}", source.record_at(index)?.dump_line(index));
            }
        }
        Commands::Sort {
            input,
            file,
            memory,
        } => {
            if memory == 0 {
                return Err(VaultError::InvalidMemoryBudget.into());
            }
            let records = sort_merge::sort_file(&input, &file, memory.saturating_mul(1024 * 1024))
                .with_context(|| format!("Failed to sort {}", input.display()))?;
            println!("✅ Sorted {} records into {}", records, file.display());
        }
        Commands::Partition { k, workers } => {
            let counts = partition::split_total(k, workers)?;
            let total = config::total_records(k)?;
            emit(json, &counts, |c| {
                println!("Partition of {total} records across {workers} workers:");
                for (i, n) in c.iter().enumerate() {
                    println!("  worker {i}: {n}");
                }
            })?;
        }
    }
    Ok(())
}
