//! Valwatch - validator consensus participation monitor
//!
//! Usage:
//!   valwatch --config valwatch.toml
//!   valwatch --once
//!
//! Environment Variables:
//!   VALWATCH_RPC_ADDR - node RPC address
//!   VALWATCH_REST_ADDR - chain REST address (validator registry)
//!   VALWATCH_DB_PATH - SQLite database path
//!   VALWATCH_POLL_INTERVAL_SECS - seconds between runs
//!   VALWATCH_OPERATOR_CONS_ADDR - own validator's consensus hex address

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use valwatch_backend::{
    scrapers::HttpQuery, storage::ValidatorDb, ConsensusPipeline, MonitorConfig,
    RoundAccumulator, ValidatorIndexer,
};

#[derive(Parser, Debug)]
#[command(name = "valwatch")]
#[command(about = "Validator consensus participation monitor")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "VALWATCH_CONFIG_PATH")]
    config: Option<String>,

    /// Run the pipeline once and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error); overrides RUST_LOG
    #[arg(short, long)]
    log_level: Option<String>,
}

fn load_env() {
    let _ = dotenv();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let env_file = manifest_dir.join(".env");
    if env_file.exists() {
        let _ = dotenv::from_path(&env_file);
    }
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => {
            let level = match level.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };
            tracing_subscriber::EnvFilter::new(level.to_string())
        }
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "valwatch_backend=info,valwatch=info".into()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<&str>) -> Result<MonitorConfig> {
    let mut config = match path {
        Some(path) => {
            info!("Loading config from {}", path);
            MonitorConfig::from_toml_file(path)?
        }
        None => MonitorConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// One poll cycle. A failed run publishes nothing; the next tick retries.
async fn poll_once(
    config: &MonitorConfig,
    pipeline: &ConsensusPipeline,
    indexer: &ValidatorIndexer,
    accumulator: &RoundAccumulator,
) {
    let report = match pipeline.run().await {
        Ok(report) => accumulator.publish(report),
        Err(e) => {
            error!(kind = e.kind(), error = %e, "consensus run aborted");
            return;
        }
    };

    if let Err(e) = indexer.index_report(&report).await {
        warn!(height = report.height, error = %e, "indexing incomplete for this round");
    }

    for row in indexer.get_validator_info(config, report.height, accumulator) {
        debug!("{}", row);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so clap's `env =` lookups see it
    load_env();
    let args = Args::parse();

    init_tracing(args.log_level.as_deref());

    let config = load_config(args.config.as_deref()).context("invalid configuration")?;
    info!(
        rpc = %config.rpc_addr,
        rest = %config.rest_addr,
        interval_secs = config.poll_interval_secs,
        "Starting validator monitor"
    );

    let query = Arc::new(HttpQuery::new(config.request_timeout()).context("Failed to build HTTP client")?);
    let db = ValidatorDb::new(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path))?;

    let pipeline = ConsensusPipeline::from_config(query, &config);
    let indexer = ValidatorIndexer::new(Arc::new(db));
    let accumulator = RoundAccumulator::new();

    if args.once {
        poll_once(&config, &pipeline, &indexer, &accumulator).await;
        return Ok(());
    }

    // Runs execute inside the loop body, so a slow run delays the next tick
    // instead of overlapping it.
    let mut ticker = interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_once(&config, &pipeline, &indexer, &accumulator).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}
