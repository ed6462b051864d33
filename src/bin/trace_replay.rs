//! Replays an access trace against a configured file cache.
//!
//! Run with: cargo run --bin trace_replay -- --config cache.toml trace.txt
//!
//! Trace format, one access per line:
//!
//! ```text
//! # comment
//! out_0001.nc          client request: get, refresh on hit, produce + put on miss
//! out_0001.nc 4096     same, with the size of the produced file
//! +out_0002.nc         file produced without a request (prefetch)
//! ```
//!
//! Files live in an in-memory storage, so nothing touches the disk.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use simcache::builder::CacheBuilder;
use simcache::config::{CacheConfig, PolicyKind};
use simcache::entry::CacheEntry;
use simcache::env::{CacheEnv, FlatProducer};
use simcache::error::CacheError;
use simcache::storage::MemoryStorage;
use simcache::traits::FileCache;

#[derive(Parser, Debug)]
#[command(name = "trace_replay", about = "Replay a file access trace against a simcache policy")]
struct Cli {
    /// Trace file, one key per line.
    trace: PathBuf,

    /// TOML cache configuration; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured policy.
    #[arg(short, long)]
    policy: Option<PolicyKind>,

    /// Overrides the configured capacity.
    #[arg(long)]
    capacity: Option<usize>,

    /// Regeneration cost charged for every file.
    #[arg(long, default_value_t = 100)]
    cost: u64,

    /// Size recorded for files whose trace line gives none.
    #[arg(long, default_value_t = 1)]
    default_size: u64,
}

#[derive(Debug, PartialEq, Eq)]
struct Access<'a> {
    key: &'a str,
    size: Option<u64>,
    requested: bool,
}

fn parse_line(line: &str) -> Option<Access<'_>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (requested, line) = match line.strip_prefix('+') {
        Some(rest) => (false, rest.trim_start()),
        None => (true, line),
    };
    let mut fields = line.split_whitespace();
    let key = fields.next()?;
    let size = fields.next().and_then(|size| size.parse().ok());
    Some(Access { key, size, requested })
}

fn replay_access(
    cache: &mut dyn FileCache,
    storage: &MemoryStorage,
    access: &Access<'_>,
    default_size: u64,
) -> Result<(), CacheError> {
    if access.requested && cache.get(access.key).is_some() {
        if let Some(entry) = cache.entry_mut(access.key) {
            entry.record_use();
        }
        return cache.refresh(access.key);
    }
    if cache.internal_lookup(access.key).is_some() {
        return Ok(());
    }

    let size = access.size.unwrap_or(default_size);
    storage.insert_file(access.key, size);
    let mut entry = CacheEntry::available(access.key, access.key, size);
    if access.requested {
        entry.record_use();
    }
    cache.put(access.key, entry)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => CacheConfig::load(path)?,
        None => CacheConfig::default(),
    };
    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }

    let storage = Arc::new(MemoryStorage::new());
    let env = CacheEnv::new(storage.clone(), Arc::new(FlatProducer(cli.cost)));
    let mut cache = CacheBuilder::new(config).build(env)?;

    let trace = std::fs::read_to_string(&cli.trace)?;
    info!(cache = %cache.name(), trace = %cli.trace.display(), "replaying trace");

    for (line_no, line) in trace.lines().enumerate() {
        let Some(access) = parse_line(line) else {
            continue;
        };
        if let Err(err) = replay_access(cache.as_mut(), &storage, &access, cli.default_size) {
            if err.is_fatal() {
                return Err(err.into());
            }
            warn!(line = line_no + 1, key = access.key, error = %err, "access failed");
        }
    }

    let counters = cache.counters();
    println!("lookups: {}", counters.lookups());
    println!("hits: {}", counters.hits);
    println!("misses: {}", counters.misses);
    println!("hit_rate: {:.4}", counters.hit_rate());
    println!("evictions: {}", counters.evictions);
    println!("fifo_evictions: {}", counters.fifo_evictions);
    println!("eviction_failures: {}", counters.eviction_failures);
    print!("{}", cache.status_summary());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "trace replay failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
