//! decklens: score Anki deck cards against a study document.
//!
//! Uploads a deck and a PDF to the processing server, follows the job until
//! it finishes, prints a relevance report, and optionally downloads the
//! tagged deck.

mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info};

use decklens_client::{ClientConfig, DeckProcessor, FlowEvent, HttpDeckApi, StatusRoute};
use decklens_core::{
    relevance_tag, sanitize_tag_prefix, EmbeddingModel, FileSlot, ProcessingMetrics,
    RelevanceBand, ResultData, Session, Statistics,
};
use decklens_report::{render_report, BarChart, LegendState, ReportOptions, ScatterPlot};

/// Exit code for input the client rejected before contacting the server.
const EXIT_INVALID_INPUT: u8 = 2;

#[derive(Parser)]
#[command(name = "decklens")]
#[command(author, version, about = "Score Anki deck cards against a study document")]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    server: ServerArgs,

    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ServerArgs {
    /// Config file (default: ~/.config/decklens/client.toml, then DECKLENS_* env vars)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Processing server base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Milliseconds between status requests
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Status endpoint: jobs, upload-progress or auto
    #[arg(long, global = true)]
    status_route: Option<StatusRoute>,

    /// Give up after this many consecutive failed status requests
    #[arg(long, global = true)]
    max_poll_errors: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the processing server is up
    Health,

    /// List the supported embedding models
    Models,

    /// Show how a tag prefix is sanitized and the tags it produces
    TagPrefix {
        /// Raw tag prefix
        prefix: String,
    },

    /// Upload a deck and a study document and report card relevance
    Process(ProcessArgs),
}

#[derive(Args)]
struct ProcessArgs {
    /// Anki deck (.apkg)
    #[arg(short, long)]
    deck: PathBuf,

    /// Study material (.pdf)
    #[arg(short, long)]
    study: PathBuf,

    /// Tag prefix for relevance tags (sanitized to letters, digits and _)
    #[arg(short, long)]
    tag: String,

    /// Embedding model
    #[arg(short, long, default_value_t = EmbeddingModel::default())]
    model: EmbeddingModel,

    /// Save the tagged deck here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip the startup health check
    #[arg(long)]
    skip_health: bool,

    /// Print the result as JSON instead of the text report
    #[arg(long)]
    json: bool,

    /// Highlight one relevance band in the charts
    #[arg(long, value_enum)]
    highlight: Option<BandArg>,

    /// Width of the scatter plot in characters
    #[arg(long, default_value_t = 60)]
    width: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum BandArg {
    High,
    Medium,
    Low,
}

impl From<BandArg> for RelevanceBand {
    fn from(band: BandArg) -> Self {
        match band {
            BandArg::High => RelevanceBand::High,
            BandArg::Medium => RelevanceBand::Medium,
            BandArg::Low => RelevanceBand::Low,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let invalid_input = e
                .downcast_ref::<decklens_core::Error>()
                .is_some_and(decklens_core::Error::is_validation);
            if invalid_input {
                ExitCode::from(EXIT_INVALID_INPUT)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Models => {
            cmd_models();
            Ok(())
        }
        Commands::TagPrefix { prefix } => cmd_tag_prefix(&prefix),
        Commands::Health => {
            let config = load_config(&cli.server)?;
            cmd_health(&config).await
        }
        Commands::Process(args) => {
            let config = load_config(&cli.server)?;
            cmd_process(&config, args).await
        }
    }
}

/// Config file or environment, then command-line overrides.
fn load_config(args: &ServerArgs) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::load().context("Failed to load configuration")?,
    };

    if let Some(url) = &args.base_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(ms) = args.poll_interval_ms {
        config = config.with_poll_interval_ms(ms);
    }
    if let Some(route) = args.status_route {
        config = config.with_status_route(route);
    }
    if args.max_poll_errors.is_some() {
        config = config.with_poll_max_consecutive_errors(args.max_poll_errors);
    }

    config.validate()?;
    debug!(?config, "Effective configuration");
    Ok(config)
}

fn cmd_models() {
    let default = EmbeddingModel::default();
    for model in EmbeddingModel::ALL {
        let marker = if model == default { " (default)" } else { "" };
        println!("{:<42} {}{}", model.id(), model.description(), marker);
    }
}

fn cmd_tag_prefix(raw: &str) -> anyhow::Result<()> {
    let prefix = sanitize_tag_prefix(raw);
    if prefix.is_empty() {
        bail!(decklens_core::Error::EmptyTagPrefix);
    }
    println!("{}", prefix);
    for band in RelevanceBand::ALL {
        println!("  {:<18} {}", band.label(), relevance_tag(&prefix, band));
    }
    Ok(())
}

async fn cmd_health(config: &ClientConfig) -> anyhow::Result<()> {
    let api = HttpDeckApi::new(config)?;
    let processor = DeckProcessor::new(Arc::new(api), config);
    let health = processor
        .check_health()
        .await
        .with_context(|| format!("Processing server at {} is not reachable", config.api_root()))?;
    println!("{}: {}", config.api_root(), health.message);
    Ok(())
}

fn select_input(session: &mut Session, slot: FileSlot, path: &Path) -> anyhow::Result<()> {
    session.select_path(slot, path).map_err(|e| {
        if e.is_validation() {
            anyhow::Error::new(e)
        } else {
            anyhow::Error::new(e).context(format!("Failed to read {} file {}", slot, path.display()))
        }
    })
}

/// Fill the session from the arguments. Touches only the local disk.
fn prepare_session(session: &mut Session, args: &ProcessArgs) -> anyhow::Result<()> {
    select_input(session, FileSlot::Deck, &args.deck)?;
    select_input(session, FileSlot::Study, &args.study)?;
    let prefix = session.set_tag_prefix(&args.tag).to_string();
    if prefix.is_empty() {
        bail!(decklens_core::Error::EmptyTagPrefix);
    }
    session.set_model(args.model);
    if prefix != args.tag {
        eprintln!("Tag prefix sanitized to \"{}\"", prefix);
    }
    Ok(())
}

async fn cmd_process(config: &ClientConfig, args: ProcessArgs) -> anyhow::Result<()> {
    let api = Arc::new(HttpDeckApi::new(config)?);
    let mut processor = DeckProcessor::new(api, config);

    prepare_session(processor.session_mut(), &args)?;

    if !args.skip_health {
        processor.check_health().await.with_context(|| {
            format!("Processing server at {} is not reachable", config.api_root())
        })?;
    }

    let mut events = processor.subscribe();
    let outcome = {
        let run = processor.run();
        tokio::pin!(run);
        loop {
            tokio::select! {
                outcome = &mut run => break outcome.map(ResultData::clone),
                event = events.recv() => match event {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Progress events dropped"),
                    Err(RecvError::Closed) => {}
                },
            }
        }
    };
    drain_events(&mut events);
    let result = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&JsonReport::new(&result))?);
    } else {
        let mut legend = LegendState::new();
        if let Some(band) = args.highlight {
            legend.toggle(band.into());
        }
        let options = ReportOptions {
            grid_width: args.width.max(10),
            legend,
            ..ReportOptions::default()
        };
        println!("{}", render_report(&result, &options));
    }

    if let Some(output) = &args.output {
        let written = processor
            .download_result(output)
            .await
            .with_context(|| format!("Failed to download tagged deck to {}", output.display()))?;
        info!(bytes = written, path = %output.display(), "Saved tagged deck");
        eprintln!("Saved tagged deck to {} ({} bytes)", output.display(), written);
    }

    Ok(())
}

fn drain_events(events: &mut broadcast::Receiver<FlowEvent>) {
    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

/// Progress lines go to stderr so stdout stays parseable.
fn print_event(event: &FlowEvent) {
    match event {
        FlowEvent::Submitting => eprintln!("Uploading deck and study material..."),
        FlowEvent::Accepted { job_id } => eprintln!("Job {} accepted, processing", job_id),
        FlowEvent::Progress(progress) => {
            let phase = progress.phase.as_deref().unwrap_or("processing");
            match progress.estimated_seconds_remaining {
                Some(remaining) => eprintln!(
                    "[{:>3}%] {} ({:.0}s elapsed, ~{:.0}s left)",
                    progress.percent, phase, progress.elapsed_seconds, remaining
                ),
                None => eprintln!(
                    "[{:>3}%] {} ({:.0}s elapsed)",
                    progress.percent, phase, progress.elapsed_seconds
                ),
            }
        }
        FlowEvent::TickSkipped { error, consecutive } => {
            eprintln!("Status check failed ({}), retrying [{}]", error, consecutive)
        }
        FlowEvent::Completed => eprintln!("Processing complete"),
        FlowEvent::Failed { message } => eprintln!("Processing failed: {}", message),
        FlowEvent::Reset => {}
    }
}

/// Machine-readable output of `process --json`.
#[derive(Serialize)]
struct JsonReport<'a> {
    statistics: &'a Statistics,
    processing_metrics: Option<&'a ProcessingMetrics>,
    bar_chart: BarChart,
    scatter: ScatterPlot,
    download_url: Option<&'a str>,
}

impl<'a> JsonReport<'a> {
    fn new(result: &'a ResultData) -> Self {
        Self {
            statistics: &result.statistics,
            processing_metrics: result.processing_metrics.as_ref(),
            bar_chart: BarChart::from_result(result),
            scatter: ScatterPlot::from_result(result),
            download_url: result.download_url.as_deref(),
        }
    }
}
