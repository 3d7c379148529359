//! iptv-rank: IPTV channel probe, score and rank tool.
//!
//! Fetches channel lists, probes every candidate URL of every wanted
//! channel, keeps the best URLs per channel and writes them out in the
//! canonical channel order.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use iptv_rank_protocol::{
    ChannelNormalizer, DefaultNormalizer, DEFAULT_PROBE_CONCURRENCY, DEFAULT_TOP_K,
};
use thiserror::Error;

mod logging;
mod metrics;
mod output;
mod pipeline;
mod probe;
mod source;

use metrics::{ProbeMetrics, RunMetrics};
use pipeline::{Pipeline, PipelineConfig};
use probe::media_probe::{DEFAULT_ARGS, DEFAULT_PROGRAM};
use probe::prober::{DEFAULT_LOCAL_PATTERNS, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_SAMPLE_SECS};
use probe::quality_scorer::DEFAULT_SCORE_FLOOR;
use probe::{CommandProbe, MediaProbe, ProbeSettings, QualityScorer, StreamProber};
use source::{prepare_inputs, PrepareOptions, SourceFetcher};

const DEFAULT_CONFIG_FILE: &str = "iptv-rank.toml";
const DEFAULT_OUTPUT: &str = "result.txt";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// iptv-rank - Probe, score and rank IPTV channel sources
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Channel list source (URL or file), may be repeated
    #[arg(short, long = "source")]
    sources: Vec<String>,

    /// Canonical channel order source (URL or file)
    #[arg(short, long)]
    order: Option<String>,

    /// Output playlist path
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Write a JSON report with every probe result
    #[arg(long)]
    report: Option<PathBuf>,

    /// Maximum concurrent probes per channel
    #[arg(short = 'c', long, default_value_t = DEFAULT_PROBE_CONCURRENCY)]
    probe_concurrency: usize,

    /// Number of URLs kept per channel
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Channels ranked at the same time
    #[arg(long, default_value = "1")]
    channel_concurrency: usize,

    /// Cap on probes in flight across all channels
    #[arg(long)]
    max_total_probes: Option<usize>,

    /// Overall timeout of one probe in seconds
    #[arg(short, long, default_value_t = DEFAULT_PROBE_TIMEOUT_SECS)]
    timeout: u64,

    /// Seconds of media sampled by one probe
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SECS)]
    sample: u64,

    /// Keep channel names as written instead of normalizing them
    #[arg(long)]
    no_normalize: bool,

    /// Keep duplicate URLs within a channel
    #[arg(long)]
    no_dedup: bool,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value_t = DEFAULT_LOG_RETENTION_DAYS)]
    log_retention_days: u64,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    sources: SourcesSection,
    #[serde(default)]
    probe: ProbeSection,
    #[serde(default)]
    scoring: ScoringSection,
    #[serde(default)]
    pipeline: PipelineSection,
    #[serde(default)]
    output: OutputSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct SourcesSection {
    channels: Option<Vec<String>>,
    order: Option<String>,
    fetch_timeout_secs: Option<u64>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct ProbeSection {
    program: Option<String>,
    args: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    sample_secs: Option<u64>,
    concurrency: Option<usize>,
    local_patterns: Option<Vec<String>>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct ScoringSection {
    floor: Option<u32>,
    resolution: Option<BTreeMap<String, u32>>,
    bitrate: Option<BTreeMap<String, u32>>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct PipelineSection {
    top_k: Option<usize>,
    channel_concurrency: Option<usize>,
    max_total_probes: Option<usize>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct OutputSection {
    path: Option<String>,
    report: Option<String>,
    dedup_urls: Option<bool>,
    normalize_names: Option<bool>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Invalid effective configuration.
#[derive(Debug, Error, PartialEq, Eq)]
enum ConfigError {
    #[error("No channel source given (use --source or [sources] channels)")]
    NoSources,

    #[error("No canonical order source given (use --order or [sources] order)")]
    NoOrder,

    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),

    #[error("Probe timeout ({timeout}s) must be longer than the sample duration ({sample}s)")]
    TimeoutTooShort { timeout: u64, sample: u64 },

    #[error("Probe command must not be empty")]
    EmptyProgram,
}

/// Effective settings after merging CLI and config file.
#[derive(Debug, Clone)]
struct RunConfig {
    sources: Vec<String>,
    order: Option<String>,
    fetch_timeout: Duration,
    output: PathBuf,
    report: Option<PathBuf>,
    program: String,
    program_args: Vec<String>,
    timeout_secs: u64,
    sample_secs: u64,
    local_patterns: Vec<String>,
    score_floor: u32,
    resolution_table: BTreeMap<String, u32>,
    bitrate_table: BTreeMap<String, u32>,
    pipeline: PipelineConfig,
    prepare: PrepareOptions,
}

impl RunConfig {
    /// Merge settings (command line takes precedence when changed from its default).
    fn resolve(args: &Args, file: ConfigFile) -> Self {
        let sources = if args.sources.is_empty() {
            file.sources.channels.unwrap_or_default()
        } else {
            args.sources.clone()
        };

        let output = if args.output.to_string_lossy() != DEFAULT_OUTPUT {
            args.output.clone()
        } else {
            PathBuf::from(file.output.path.as_deref().unwrap_or(DEFAULT_OUTPUT))
        };

        let probe_concurrency = if args.probe_concurrency != DEFAULT_PROBE_CONCURRENCY {
            args.probe_concurrency
        } else {
            file.probe.concurrency.unwrap_or(DEFAULT_PROBE_CONCURRENCY)
        };

        let top_k = if args.top_k != DEFAULT_TOP_K {
            args.top_k
        } else {
            file.pipeline.top_k.unwrap_or(DEFAULT_TOP_K)
        };

        let channel_concurrency = if args.channel_concurrency != 1 {
            args.channel_concurrency
        } else {
            file.pipeline.channel_concurrency.unwrap_or(1)
        };

        let timeout_secs = if args.timeout != DEFAULT_PROBE_TIMEOUT_SECS {
            args.timeout
        } else {
            file.probe.timeout_secs.unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS)
        };

        let sample_secs = if args.sample != DEFAULT_SAMPLE_SECS {
            args.sample
        } else {
            file.probe.sample_secs.unwrap_or(DEFAULT_SAMPLE_SECS)
        };

        let prepare = PrepareOptions {
            normalize: !args.no_normalize && file.output.normalize_names.unwrap_or(true),
            dedup_urls: !args.no_dedup && file.output.dedup_urls.unwrap_or(true),
            drop_unwanted: true,
        };

        Self {
            sources,
            order: args.order.clone().or(file.sources.order),
            fetch_timeout: Duration::from_secs(
                file.sources
                    .fetch_timeout_secs
                    .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            ),
            output,
            report: args
                .report
                .clone()
                .or_else(|| file.output.report.map(PathBuf::from)),
            program: file
                .probe
                .program
                .unwrap_or_else(|| DEFAULT_PROGRAM.to_string()),
            program_args: file
                .probe
                .args
                .unwrap_or_else(|| DEFAULT_ARGS.iter().map(|a| a.to_string()).collect()),
            timeout_secs,
            sample_secs,
            local_patterns: file.probe.local_patterns.unwrap_or_else(|| {
                DEFAULT_LOCAL_PATTERNS
                    .iter()
                    .map(|p| p.to_string())
                    .collect()
            }),
            score_floor: file.scoring.floor.unwrap_or(DEFAULT_SCORE_FLOOR),
            resolution_table: file
                .scoring
                .resolution
                .unwrap_or_else(QualityScorer::default_resolution_table),
            bitrate_table: file
                .scoring
                .bitrate
                .unwrap_or_else(QualityScorer::default_bitrate_table),
            pipeline: PipelineConfig {
                probe_concurrency,
                top_k,
                channel_concurrency,
                max_total_probes: args.max_total_probes.or(file.pipeline.max_total_probes),
            },
            prepare,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if self.order.is_none() {
            return Err(ConfigError::NoOrder);
        }
        if self.pipeline.probe_concurrency == 0 {
            return Err(ConfigError::ZeroLimit("probe_concurrency"));
        }
        if self.pipeline.top_k == 0 {
            return Err(ConfigError::ZeroLimit("top_k"));
        }
        if self.pipeline.channel_concurrency == 0 {
            return Err(ConfigError::ZeroLimit("channel_concurrency"));
        }
        if self.pipeline.max_total_probes == Some(0) {
            return Err(ConfigError::ZeroLimit("max_total_probes"));
        }
        if self.timeout_secs <= self.sample_secs {
            return Err(ConfigError::TimeoutTooShort {
                timeout: self.timeout_secs,
                sample: self.sample_secs,
            });
        }
        if self.program.trim().is_empty() {
            return Err(ConfigError::EmptyProgram);
        }
        Ok(())
    }

    fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            sample: Duration::from_secs(self.sample_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            local_patterns: self.local_patterns.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    });
    let file_config = if let Some(config_path) = &config_path {
        match load_config(config_path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", config_path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        }
    } else {
        ConfigFile::default()
    };

    // Merge logging configs (command line takes precedence)
    let log_dir = if args.log_dir.to_string_lossy() != DEFAULT_LOG_DIR {
        args.log_dir.clone()
    } else {
        PathBuf::from(
            file_config
                .logging
                .log_dir
                .as_deref()
                .unwrap_or(DEFAULT_LOG_DIR),
        )
    };

    let log_retention_days = if args.log_retention_days != DEFAULT_LOG_RETENTION_DAYS {
        args.log_retention_days
    } else {
        file_config
            .logging
            .retention_days
            .unwrap_or(DEFAULT_LOG_RETENTION_DAYS)
    };

    let log_level = file_config.logging.level.clone();
    logging::init_logging(&log_dir, log_retention_days, args.verbose, log_level.as_deref())
        .expect("Failed to initialize logging");

    // Use log macros which are now bridged to tracing
    use log::{error, info, warn};

    let config = RunConfig::resolve(&args, file_config);
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }
    let order_source = config.order.clone().ok_or(ConfigError::NoOrder)?;

    info!("iptv-rank starting...");
    info!("  Sources: {}", config.sources.len());
    info!("  Canonical order: {}", order_source);
    info!(
        "  Probe: {} (timeout {}s, sample {}s)",
        config.program, config.timeout_secs, config.sample_secs
    );
    info!(
        "  Concurrency: {} per channel, {} channel(s), global cap {:?}",
        config.pipeline.probe_concurrency,
        config.pipeline.channel_concurrency,
        config.pipeline.max_total_probes
    );
    info!("  Top-K: {}", config.pipeline.top_k);
    info!("  Output: {:?}", config.output);

    // Fetch inputs
    let fetcher = SourceFetcher::new(config.fetch_timeout)?;
    let order = match fetcher.fetch_canonical_order(&order_source).await {
        Ok(order) => order,
        Err(e) => {
            error!("Failed to fetch canonical order: {}", e);
            return Err(e.into());
        }
    };
    let candidates = match fetcher.fetch_channel_candidates(&config.sources).await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!("Failed to fetch channel sources: {}", e);
            return Err(e.into());
        }
    };

    let normalizer: &dyn ChannelNormalizer = &DefaultNormalizer;
    let prepared = prepare_inputs(candidates, order, normalizer, config.prepare);
    if prepared.candidates.is_empty() {
        warn!("No candidate channel matches the canonical order");
    }

    // Build the pipeline
    let probe_metrics = ProbeMetrics::new();
    let run_metrics = RunMetrics::new();
    let media: Arc<dyn MediaProbe> = Arc::new(CommandProbe::new(
        config.program.clone(),
        config.program_args.clone(),
    ));
    let scorer = QualityScorer::new(
        config.resolution_table.clone(),
        config.bitrate_table.clone(),
        config.score_floor,
    );
    info!("  Score floor: {}", scorer.floor());
    let prober = Arc::new(StreamProber::new(
        media,
        scorer,
        config.probe_settings(),
        Arc::clone(&probe_metrics),
    ));
    let pipeline = Pipeline::new(prober, config.pipeline.clone(), Arc::clone(&run_metrics));

    // Dropping the run on Ctrl-C aborts its probe tasks and kills their processes.
    let mut result = tokio::select! {
        result = pipeline.run(&prepared.candidates, &prepared.order) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, no output written");
            probe_metrics.print_report();
            return Err("interrupted".into());
        }
    };

    prepared.display_names.restore(&mut result);

    if let Err(e) = output::write_output(&config.output, &result.entries).await {
        error!("{}", e);
        return Err(e.into());
    }
    if let Some(report) = &config.report {
        if let Err(e) = output::write_report(report, &result).await {
            error!("{}", e);
            return Err(e.into());
        }
    }

    probe_metrics.print_report();
    run_metrics.print_report();

    Ok(())
}
