use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cdrflow::classify::{EndpointDirectory, ExtensionPlan, SipEndpointDirectory};
use cdrflow::config::Config;
use cdrflow::engine::{Engine, EngineSettings};
use cdrflow::sink::CsvCallSink;
use cdrflow::source::FileRecordSource;
use cdrflow::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "cdrflow")]
#[command(author, version, about = "CDR correlation and normalization engine for OpenScape Voice")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override the configured input path
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Override the configured output file
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(input) = args.input {
        config.input.path = input;
    }
    if let Some(output) = args.output {
        config.output.path = output;
    }

    init_tracing(&config.telemetry)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        input = %config.input.path.display(),
        output = %config.output.path.display(),
        "starting cdrflow"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let extensions = ExtensionPlan::from_patterns(&config.extensions.ranges)
        .context("invalid extension ranges")?;
    if extensions.is_empty() {
        warn!("no extension ranges configured; running in discovery mode");
    }

    let endpoints: Arc<dyn EndpointDirectory> = match &config.endpoints.file {
        Some(path) => Arc::new(
            SipEndpointDirectory::from_file(path)
                .with_context(|| format!("failed to load endpoint file {}", path.display()))?,
        ),
        None => Arc::new(SipEndpointDirectory::empty()),
    };
    if !endpoints.is_loaded() {
        warn!("no SIP endpoint directory loaded; direction falls back to party-id markers");
    }

    let mut source = FileRecordSource::from_path(&config.input.path)
        .with_context(|| format!("failed to open input {}", config.input.path.display()))?;
    let mut sink = CsvCallSink::create(&config.output.path)
        .with_context(|| format!("failed to create output {}", config.output.path.display()))?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, aborting after current file");
            signal_token.cancel();
        }
    });

    let settings = EngineSettings {
        max_cached_legs: config.streaming.max_cached_legs,
        detect_completion: config.streaming.detect_completion,
    };
    let mut engine = Engine::new(
        settings,
        extensions.clone(),
        endpoints,
        config.voicemail.number.clone(),
        config.routing.numbers.clone(),
        cancel,
    );

    let report = engine.run(&mut source, &mut sink).await?;

    for err in &report.parse_errors {
        warn!(file = %err.file, line = err.line, "{}", err.message);
    }
    if extensions.is_empty() && !report.candidate_extensions.is_empty() {
        info!(
            candidates = report.candidate_extensions.len(),
            "discovered extension candidates"
        );
        for candidate in report.candidate_extensions.iter().take(50) {
            info!(
                number = %candidate.number,
                occurrences = candidate.occurrences,
                reasons = %candidate.reasons.join("; "),
                "extension candidate"
            );
        }
    }

    info!(
        lines = report.lines_seen,
        records = report.records_parsed,
        legs = report.legs_built,
        calls = report.calls_emitted,
        suppressed = report.records_suppressed,
        errors = report.parse_errors.len(),
        unknown_endpoints = report.unknown_endpoints.len(),
        aborted = report.aborted,
        "cdrflow finished"
    );

    Ok(())
}
