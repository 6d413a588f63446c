//! nregacache - keeps MGNREGA district performance data available when the
//! government portal is not.
//!
//! By default this runs the refresh daemon until Ctrl-C. One-shot maintenance
//! commands are available as flags.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nregacache_core::{
    Config, PeriodId, RecordStore, RefreshScheduler, RegionId, RetrievalPipeline,
};

// ============================================================================
// Constants
// ============================================================================

/// Rolling log file name prefix
const LOG_FILE_PREFIX: &str = "nregacache.log";

const USAGE: &str = "\
Usage: nregacache [COMMAND]

Commands:
  (none)                              Run the refresh daemon until Ctrl-C
  --refresh-now                       Run one refresh batch and print the status
  --cleanup                           Delete records past the retention window
  --get <region> <period> [--no-cache]
                                      Print one record as JSON
  --status                            Print configuration and store summary
  --init-config                       Write the config file with every default filled in
  --help                              Show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Daemon,
    RefreshNow,
    Cleanup,
    Get {
        region: String,
        period: String,
        use_cache: bool,
    },
    Status,
    InitConfig,
    Help,
}

impl Command {
    /// Log level used when `RUST_LOG` is not set.
    fn default_log_level(&self) -> &'static str {
        match self {
            Command::Daemon | Command::RefreshNow | Command::Cleanup => "info",
            _ => "warn",
        }
    }
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(first) = args.first() else {
        return Ok(Command::Daemon);
    };

    let command = match first.as_str() {
        "--refresh-now" => Command::RefreshNow,
        "--cleanup" => Command::Cleanup,
        "--status" => Command::Status,
        "--init-config" => Command::InitConfig,
        "--help" | "-h" => Command::Help,
        "--get" => {
            let (Some(region), Some(period)) = (args.get(1), args.get(2)) else {
                bail!("--get needs a region and a period, e.g. --get 0901 2024-25");
            };
            let use_cache = match args.get(3).map(String::as_str) {
                None => true,
                Some("--no-cache") => false,
                Some(other) => bail!("Unexpected argument: {}", other),
            };
            return Ok(Command::Get {
                region: region.clone(),
                period: period.clone(),
                use_cache,
            });
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    };

    if let Some(extra) = args.get(1) {
        bail!("Unexpected argument: {}", extra);
    }
    Ok(command)
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when a log directory is usable, to a daily rolling
/// file. The returned guard must stay alive for file output to be flushed.
fn init_tracing(log_dir: Option<&Path>, default_level: &str) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_dir = log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok());
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    if command == Command::InitConfig {
        // Saved before env overrides so `.env` values stay out of the file
        config.save()?;
        println!("Wrote {}", Config::config_path()?.display());
        return Ok(());
    }
    config.apply_env();

    let log_dir = config.log_dir().ok();
    let _log_guard = init_tracing(log_dir.as_deref(), command.default_log_level());
    info!(version = env!("CARGO_PKG_VERSION"), "nregacache starting");

    let data_dir = config.data_dir()?;
    let store = Arc::new(RecordStore::open(&data_dir));
    let pipeline = Arc::new(
        RetrievalPipeline::from_config(&config, Arc::clone(&store))
            .context("Failed to build retrieval pipeline")?,
    );
    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::clone(&pipeline),
        config.scheduler.clone(),
    ));

    match command {
        Command::Daemon => run_daemon(scheduler).await?,
        Command::RefreshNow => {
            let outcome = scheduler.run_refresh_now().await;
            info!(?outcome, "Refresh finished");
            println!("{}", serde_json::to_string_pretty(&scheduler.status())?);
        }
        Command::Cleanup => {
            let deleted = scheduler.run_cleanup().await.unwrap_or(0);
            println!("Deleted {} records", deleted);
        }
        Command::Get {
            region,
            period,
            use_cache,
        } => {
            let region = RegionId::parse(&region)?;
            let period = PeriodId::parse(&period)?;
            let record = pipeline.get_record(&region, &period, use_cache).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Status => {
            let summary = serde_json::json!({
                "configPath": Config::config_path()?.display().to_string(),
                "dataDir": data_dir.display().to_string(),
                "storeAvailable": store.is_available(),
                "records": store.record_count().await,
                "regions": store.list_regions().await.len(),
                "cacheLayers": pipeline.cache_layer_names(),
                "currentPeriod": PeriodId::current().to_string(),
                "config": config,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::InitConfig | Command::Help => {}
    }

    info!("nregacache shutting down");
    Ok(())
}

async fn run_daemon(scheduler: Arc<RefreshScheduler>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = Arc::clone(&scheduler).spawn(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    // Send fails only if the scheduler already exited
    let _ = shutdown_tx.send(());
    handle.await.context("Scheduler task panicked")?;
    Ok(())
}
