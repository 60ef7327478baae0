//! Query Cache Simulation Binary
//!
//! Drives many simulated consumers against one cache store: consumers attach
//! to random keys, occasionally refetch or write data directly, and detach
//! again, while fetches complete after random latencies and sometimes fail.
//! At the end the store statistics show how many fetches were coalesced.
//!
//! Run with: `cargo run --bin simulate -- --consumers 32 --keys 4`

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use thiserror::Error;
use tokio::task::LocalSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt};

use query_cache::app::{CacheStore, QueryBinding, QueryResult, SettlementPolicy};
use query_cache::config::{AppConfig, LoggingConfig};
use query_cache::constants::simulation;

/// Simulate consumers sharing a query cache
#[derive(Parser, Debug)]
#[command(name = "simulate", version, about = "Simulate consumers sharing a query cache")]
struct Args {
    /// Number of distinct keys
    #[arg(short, long, default_value_t = simulation::DEFAULT_KEY_COUNT)]
    keys: usize,

    /// Number of simulated consumers
    #[arg(short, long, default_value_t = simulation::DEFAULT_CONSUMER_COUNT)]
    consumers: usize,

    /// Attach/detach rounds per consumer
    #[arg(short, long, default_value_t = simulation::DEFAULT_ROUNDS)]
    rounds: usize,

    /// Minimum fetch latency in milliseconds
    #[arg(long, default_value_t = simulation::MIN_LATENCY_MS)]
    min_latency_ms: u64,

    /// Maximum fetch latency in milliseconds
    #[arg(long, default_value_t = simulation::MAX_LATENCY_MS)]
    max_latency_ms: u64,

    /// Fraction of fetches that fail (0.0-1.0)
    #[arg(long, default_value_t = simulation::DEFAULT_FAILURE_RATE)]
    failure_rate: f64,

    /// Settlement policy (last_settled or latest_issued), overrides the config file
    #[arg(long)]
    settlement: Option<SettlementPolicy>,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Failure produced by the simulated backend
#[derive(Error, Debug)]
#[error("simulated failure fetching {key} (attempt {attempt})")]
struct SimulatedFailure {
    key: String,
    attempt: u64,
}

type Store = CacheStore<String, String, SimulatedFailure>;

/// Per-run counters kept outside the store
#[derive(Debug, Default)]
struct RunCounters {
    fetches_by_key: RefCell<HashMap<String, u64>>,
    results_seen: Cell<u64>,
    errors_seen: Cell<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.clone())
        .await
        .context("failed to load configuration")?;
    init_logging(&config.logging, args.verbose);

    anyhow::ensure!(
        (0.0..=1.0).contains(&args.failure_rate),
        "failure rate must be between 0.0 and 1.0"
    );
    anyhow::ensure!(
        args.min_latency_ms <= args.max_latency_ms,
        "minimum latency must not exceed maximum latency"
    );
    anyhow::ensure!(args.keys > 0, "at least one key is required");

    let mut cache_config = config.to_runtime_config();
    if let Some(settlement) = args.settlement {
        cache_config = cache_config.with_settlement(settlement);
    }
    info!(
        "Simulating {} consumers over {} keys ({} rounds, {:?})",
        args.consumers, args.keys, args.rounds, cache_config
    );

    let store = Store::with_config(cache_config);
    let counters = Rc::new(RunCounters::default());
    let started = Instant::now();

    LocalSet::new()
        .run_until(async {
            run_consumers(&args, &store, &counters).await;
            // Let fetches of detached entries finish so their settlements are counted
            sleep(Duration::from_millis(args.max_latency_ms + 10)).await;
        })
        .await;

    print_summary(&store, &counters, started.elapsed());

    if !store.is_empty() {
        warn!("{} entries left in store after all consumers detached", store.len());
    }
    Ok(())
}

/// Initialize logging from configuration and verbosity
fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let directive = if verbose {
        LoggingConfig {
            level: "debug".to_string(),
            ..logging.clone()
        }
        .filter_directive()
    } else {
        logging.filter_directive()
    };

    let filter = match directive.parse::<Directive>() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(logging.show_target)
        .init();
}

async fn run_consumers(args: &Args, store: &Store, counters: &Rc<RunCounters>) {
    let mut handles = Vec::with_capacity(args.consumers);

    for consumer_id in 0..args.consumers {
        let store = store.clone();
        let counters = Rc::clone(counters);
        let keys = args.keys;
        let rounds = args.rounds;
        let latency = (args.min_latency_ms, args.max_latency_ms);
        let failure_rate = args.failure_rate;

        handles.push(tokio::task::spawn_local(async move {
            for round in 0..rounds {
                let key = format!("item:{}", fastrand::usize(0..keys));
                let binding = attach_consumer(&store, &key, &counters, latency, failure_rate);
                debug!("Consumer {} round {} attached to {}", consumer_id, round, key);

                sleep(Duration::from_millis(fastrand::u64(latency.0..=latency.1))).await;

                match fastrand::u8(0..10) {
                    0 => binding.refetch(),
                    1 => binding.set_data(format!("{} set by consumer {}", key, consumer_id)),
                    _ => {}
                }

                sleep(Duration::from_millis(fastrand::u64(0..=latency.1))).await;
                drop(binding);
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Consumer task failed: {}", e);
        }
    }
}

fn attach_consumer(
    store: &Store,
    key: &str,
    counters: &Rc<RunCounters>,
    latency: (u64, u64),
    failure_rate: f64,
) -> QueryBinding<String, String, SimulatedFailure> {
    let fetch_counters = Rc::clone(counters);
    let fetch_key = key.to_string();
    let fetcher = move || {
        let attempt = {
            let mut fetches = fetch_counters.fetches_by_key.borrow_mut();
            let count = fetches.entry(fetch_key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let key = fetch_key.clone();
        let delay = Duration::from_millis(fastrand::u64(latency.0..=latency.1));
        let fail = fastrand::f64() < failure_rate;

        async move {
            sleep(delay).await;
            if fail {
                Err(SimulatedFailure { key, attempt })
            } else {
                Ok(format!("{} v{}", key, attempt))
            }
        }
    };

    let listener_counters = Rc::clone(counters);
    let listener = move |result: &QueryResult<String, String, SimulatedFailure>| {
        listener_counters
            .results_seen
            .set(listener_counters.results_seen.get() + 1);
        if let Some(error) = result.error() {
            listener_counters
                .errors_seen
                .set(listener_counters.errors_seen.get() + 1);
            debug!("Observed error: {}", error);
        }
    };

    QueryBinding::attach(store, Some(key.to_string()), fetcher, listener)
}

fn print_summary(store: &Store, counters: &RunCounters, elapsed: Duration) {
    let stats = store.stats();
    let fetches = counters.fetches_by_key.borrow();
    let total_fetches: u64 = fetches.values().sum();

    println!("Simulation finished in {:.2?}", elapsed);
    println!("  Store: {}", stats);
    println!(
        "  Attaches: {}, fetches issued: {} ({} coalesced)",
        stats.subscribers_attached,
        total_fetches,
        stats.subscribers_attached.saturating_sub(total_fetches)
    );
    println!(
        "  Results delivered: {}, of which errors: {}",
        counters.results_seen.get(),
        counters.errors_seen.get()
    );

    let mut keys: Vec<_> = fetches.iter().collect();
    keys.sort();
    for (key, count) in keys {
        println!("    {:<12} {} fetches", key, count);
    }
}
