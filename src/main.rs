use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream_validator::{
    config::{ValidatorConfig, defaults::DEFAULT_CONFIG_FILE},
    models::{Channel, ValidationOptions},
    services::ValidationService,
    utils::{UrlUtils, human_format::format_duration},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Chunked run with parallel lanes
    Parallel,
    /// Simple fixed-size batches
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "stream-validator")]
#[command(version)]
#[command(about = "Validate reachability of IPTV channel stream URLs")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// JSON array of channel records to validate
    #[arg(short, long, value_name = "FILE", required_unless_present = "write_default_config")]
    input: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Validation strategy
    #[arg(short, long, value_enum, default_value_t = Mode::Parallel)]
    mode: Mode,

    /// Lane count override
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Chunk size override for parallel mode
    #[arg(long, value_name = "N")]
    chunk_size: Option<usize>,

    /// Keep channels that share a stream URL
    #[arg(long)]
    keep_duplicates: bool,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write a default configuration file to --config and exit
    #[arg(long)]
    write_default_config: bool,
}

fn init_logging(level: &str, format: LogFormat) {
    let log_filter = format!("stream_validator={level}");
    let (text, json) = match format {
        LogFormat::Text => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(text)
        .with(json)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    info!("Starting stream validator v{}", env!("CARGO_PKG_VERSION"));

    if cli.write_default_config {
        if cli.config.exists() {
            bail!("Refusing to overwrite existing file {}", cli.config.display());
        }
        ValidatorConfig::write_default(&cli.config)?;
        return Ok(());
    }

    let config = ValidatorConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let Some(input) = cli.input.as_ref() else {
        bail!("--input is required");
    };
    let raw = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let channels: Vec<Channel> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing channel records from {}", input.display()))?;
    info!("Loaded {} channels from {}", channels.len(), input.display());
    let malformed = channels
        .iter()
        .filter(|channel| !UrlUtils::is_valid(&channel.stream_url))
        .count();
    if malformed > 0 {
        warn!("{} channels have malformed stream URLs and will be reported invalid", malformed);
    }

    let options = ValidationOptions {
        concurrency: cli.concurrency,
        chunk_size: cli.chunk_size,
        deduplicate: cli.keep_duplicates.then_some(false),
        ..Default::default()
    };

    let service = ValidationService::new(config)?;
    let result = match cli.mode {
        Mode::Parallel => {
            service
                .validate_channels_parallel(&channels, &options)
                .await
        }
        Mode::Batch => service.validate_channels_batch(&channels, &options).await,
    };

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("Validation aborted [{}]: {}", e.code(), e);
            return Err(e).context("validation subsystem cannot function");
        }
    };

    let stats = &report.stats;
    eprintln!(
        "Validated {} channels in {}: {} valid, {} invalid ({} cache hits, {} converted, {} duplicates removed)",
        stats.total_processed,
        format_duration(stats.elapsed_ms),
        stats.valid_count,
        stats.invalid_count,
        stats.cache_hits,
        stats.conversions,
        stats.duplicates_removed
    );

    let json = serde_json::to_string_pretty(&report)?;
    match cli.output {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
