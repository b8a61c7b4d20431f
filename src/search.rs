//! Prefix search over a sorted vault
//!
//! A query is the leading `difficulty` bytes (3 or 4) of a digest. The search
//! compares only those leading bytes of each probed record. This is sound
//! because the vault is sorted by the full 16-byte record whose first bytes
//! are the digest: comparing a prefix is monotonic with respect to that order.
//! Never run it against a file sorted by any other key.

use std::fmt;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::{validate_difficulty, SearchConfig};
use crate::error::Result;
use crate::record::Record;
use crate::vault_file::RecordSource;

pub const MAX_DIFFICULTY: usize = 4;

/// Digest prefix to look for
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Query {
    bytes: [u8; MAX_DIFFICULTY],
    len: usize,
}

impl Query {
    pub fn new(prefix: &[u8]) -> Result<Self> {
        let len = validate_difficulty(prefix.len())?;
        let mut bytes = [0u8; MAX_DIFFICULTY];
        bytes[..len].copy_from_slice(prefix);
        Ok(Self { bytes, len })
    }

    /// Leading `difficulty` bytes of an existing record
    pub fn from_record(record: &Record, difficulty: usize) -> Result<Self> {
        validate_difficulty(difficulty)?;
        Self::new(record.prefix(difficulty))
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R, difficulty: usize) -> Result<Self> {
        let len = validate_difficulty(difficulty)?;
        let mut bytes = [0u8; MAX_DIFFICULTY];
        rng.fill(&mut bytes[..len]);
        Ok(Self { bytes, len })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn difficulty(&self) -> usize {
        self.len
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({self})")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    /// Index of the first probe whose prefix equals the query
    pub found: Option<u64>,
    /// Records read and compared
    pub comparisons: u32,
}

impl SearchOutcome {
    pub fn is_match(&self) -> bool {
        self.found.is_some()
    }
}

/// Binary search that stops at the first probed midpoint matching the query
///
/// With several records sharing the prefix, the reported index is whichever
/// one the search lands on, not necessarily the first or last of them.
pub fn prefix_search<S>(source: &mut S, query: &Query) -> Result<SearchOutcome>
where
    S: RecordSource + ?Sized,
{
    let needle = query.as_bytes();
    let mut lo = 0u64;
    // exclusive upper bound: `hi - 1` is the inclusive right edge
    let mut hi = source.len();
    let mut comparisons = 0u32;

    while lo < hi {
        let mid = lo + (hi - 1 - lo) / 2;
        let record = source.record_at(mid)?;
        comparisons += 1;
        match record.prefix(query.difficulty()).cmp(needle) {
            std::cmp::Ordering::Equal => {
                return Ok(SearchOutcome {
                    found: Some(mid),
                    comparisons,
                })
            }
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
        }
    }

    Ok(SearchOutcome {
        found: None,
        comparisons,
    })
}

/// Half-open range of indices whose digest starts with the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchRange {
    pub start: u64,
    pub end: u64,
    pub comparisons: u32,
}

impl MatchRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Lexicographically first matching index
    pub fn first(&self) -> Option<u64> {
        (!self.is_empty()).then_some(self.start)
    }
}

/// Locate every record with the query prefix (lower and upper bound search)
pub fn prefix_range<S>(source: &mut S, query: &Query) -> Result<MatchRange>
where
    S: RecordSource + ?Sized,
{
    let mut comparisons = 0u32;
    let start = bound(source, query, &mut comparisons, |p, q| p < q)?;
    let end = bound(source, query, &mut comparisons, |p, q| p <= q)?;
    Ok(MatchRange {
        start,
        end,
        comparisons,
    })
}

/// First index in `[0, len)` where `go_right(prefix, query)` is false
fn bound<S, F>(source: &mut S, query: &Query, comparisons: &mut u32, go_right: F) -> Result<u64>
where
    S: RecordSource + ?Sized,
    F: Fn(&[u8], &[u8]) -> bool,
{
    let mut lo = 0u64;
    let mut hi = source.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let record = source.record_at(mid)?;
        *comparisons += 1;
        if go_right(record.prefix(query.difficulty()), query.as_bytes()) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub found: Option<u64>,
    pub comparisons: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchSummary {
    pub records: u64,
    pub difficulty: usize,
    pub searches: usize,
    pub found: usize,
    pub not_found: usize,
    pub total_comparisons: u64,
    pub avg_comparisons: f64,
    pub total_secs: f64,
    pub avg_ms: f64,
    pub searches_per_sec: f64,
    pub results: Vec<QueryResult>,
}

/// Issue `config.queries` random queries against `source`
pub fn run_searches<S>(source: &mut S, config: &SearchConfig) -> Result<SearchSummary>
where
    S: RecordSource + ?Sized,
{
    config.validate()?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    tracing::info!(
        records = source.len(),
        searches = config.queries,
        difficulty = config.difficulty,
        "Running prefix searches"
    );

    let start_time = Instant::now();
    let mut results = Vec::with_capacity(config.queries);
    for i in 0..config.queries {
        let query = Query::random(&mut rng, config.difficulty)?;
        let outcome = prefix_search(source, &query)?;
        tracing::debug!(
            index = i,
            query = %query,
            found = ?outcome.found,
            comparisons = outcome.comparisons,
            "Search"
        );
        results.push(QueryResult {
            query: query.to_string(),
            found: outcome.found,
            comparisons: outcome.comparisons,
        });
    }
    let total_secs = start_time.elapsed().as_secs_f64();

    let found = results.iter().filter(|r| r.found.is_some()).count();
    let total_comparisons: u64 = results.iter().map(|r| u64::from(r.comparisons)).sum();
    let searches = config.queries;
    let per_search = |value: f64| if searches > 0 { value / searches as f64 } else { 0.0 };

    Ok(SearchSummary {
        records: source.len(),
        difficulty: config.difficulty,
        searches,
        found,
        not_found: searches - found,
        total_comparisons,
        avg_comparisons: per_search(total_comparisons as f64),
        total_secs,
        avg_ms: per_search(total_secs * 1000.0),
        searches_per_sec: if total_secs > 0.0 {
            searches as f64 / total_secs
        } else {
            0.0
        },
        results,
    })
}
