use clap::Parser;
use log::{error, info};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chain_report::blockchain::{plan_range, BlockIngestor, RpcClient, TokenMonitor, TransactionMonitor};
use chain_report::config::AppConfig;
use chain_report::database::Database;
use chain_report::logging::init_logging;
use chain_report::retry::RetryConfig;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Ingests blocks from a permissioned chain node and classifies token contracts")]
#[command(version)]
struct Args {
    /// First block to ingest (defaults to the block after the last persisted one)
    #[arg(long)]
    from: Option<u64>,

    /// Last block to ingest, inclusive
    #[arg(long, required_unless_present = "sample_config")]
    to: Option<u64>,

    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Database path, overriding the configured one
    #[arg(long)]
    database: Option<String>,

    /// Do not fetch call traces
    #[arg(long)]
    no_trace: bool,

    /// Do not classify created contracts
    #[arg(long)]
    no_classify: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    sample_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.sample_config {
        println!("{}", AppConfig::generate_sample_config()?);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => {
            let mut config = AppConfig::load_from_path(path)?;
            config.apply_env_overrides()?;
            config.validate()?;
            config
        }
        None => AppConfig::load()?,
    };
    if let Some(path) = args.database {
        config.database.path = path;
    }
    if args.no_trace {
        config.processing.trace_internal_calls = false;
    }
    if args.no_classify {
        config.processing.classify_contracts = false;
    }

    init_logging(&config.logging)?;
    info!("Starting chain report indexer");

    let database = Arc::new(Database::open(&config.database)?);
    let client = Arc::new(RpcClient::new_with_config(
        config.rpc.endpoint.clone(),
        config.rpc.graphql_endpoint.clone(),
        config.rpc.timeout_seconds,
    )?);

    let mut monitor = TransactionMonitor::new(client.clone(), database.clone())
        .with_internal_call_tracing(config.processing.trace_internal_calls);
    if config.processing.classify_contracts {
        monitor = monitor.with_token_monitor(
            TokenMonitor::new(client.clone()).with_concurrency(config.processing.classification_concurrency),
        );
    }

    let ingestor = BlockIngestor::new(client, monitor, RetryConfig::from(&config.rpc));

    let shutdown_signal = Arc::clone(&ingestor.shutdown_signal);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                shutdown_signal.store(true, Ordering::Relaxed);
            }
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    });

    // clap guarantees `--to` unless --sample-config was given
    let to = args.to.unwrap_or_default();
    let Some(range) = plan_range(
        args.from,
        to,
        database.get_last_persisted_block()?,
        config.processing.start_block,
    )?
    else {
        info!("Blocks up to {} are already ingested", to);
        return Ok(());
    };

    match ingestor.ingest_range(*range.start(), *range.end()).await {
        Ok(report) => {
            info!(
                "Ingested {} blocks ({} transactions, {} token contracts)",
                report.blocks, report.transactions, report.token_contracts
            );
            Ok(())
        }
        Err(e) => {
            error!("Ingestion failed: {}", e);
            std::process::exit(1);
        }
    }
}
