use anyhow::{bail, Context};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use pixel_filter::codec::SUPPORTED_EXTENSIONS;
use pixel_filter::logging::{init_logging, LogConfig};
use pixel_filter::{
    print_summary_report, resolve_inputs, BatchConfig, BatchCoordinator, BatchEvent,
    BatchStatus, ChannelListener, FilterKind, LogTag,
};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

const BAR_TEMPLATE: &str = concat!(
    "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ ",
    "{percent:>3}% • ⏱️ {elapsed_precise} • {msg}"
);
const PROGRESS_CHARS: &str = "█▓░";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

#[derive(Parser)]
#[command(name = "img-filter")]
#[command(
    version,
    about = "Apply a color filter to a batch of JPEG/PNG/BMP images",
    long_about = None
)]
struct Cli {
    /// Image files or directories to scan.
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Grayscale, Sepia, Warm, Cold or Blur. Unknown names fall back to Grayscale.
    #[arg(short, long, default_value = "Grayscale")]
    filter: String,

    /// Worker threads (default: PIXEL_FILTER_THREADS, else sized from CPU count).
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    #[arg(short, long)]
    recursive: bool,

    #[arg(short, long)]
    verbose: bool,

    /// Directory for the rolling log file (default: system temp dir).
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Print the batch summary as JSON instead of the report box.
    #[arg(long)]
    json: bool,
}

fn exit_code(status: BatchStatus) -> i32 {
    match status {
        BatchStatus::Completed => 0,
        BatchStatus::CompletedWithErrors => 1,
        BatchStatus::Cancelled => 130,
    }
}

fn progress_bar(filter: FilterKind, hidden: bool) -> anyhow::Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template(BAR_TEMPLATE)
            .context("Invalid progress bar template")?
            .progress_chars(PROGRESS_CHARS)
            .tick_chars(SPINNER_CHARS),
    );
    pb.set_prefix(filter.name());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::default()
        .with_stderr(false)
        .with_level(if cli.verbose { Level::DEBUG } else { Level::INFO });
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    if let Err(e) = init_logging("img_filter", log_config) {
        eprintln!("⚠️  Logging disabled: {:#}", e);
    }

    let filter = match cli.filter.parse::<FilterKind>() {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("{} {}, using {}", style("⚠️ ").yellow(), e, FilterKind::default());
            FilterKind::default()
        }
    };

    let (inputs, rejected) = resolve_inputs(&cli.inputs, cli.recursive);
    for path in &rejected {
        eprintln!(
            "{} Skipping unsupported file: {}",
            style("⚠️ ").yellow(),
            path.display()
        );
    }
    if inputs.is_empty() {
        bail!(
            "no supported images found (expected {})",
            SUPPORTED_EXTENSIONS.join(", ")
        );
    }

    let config = match cli.threads {
        Some(n) => BatchConfig::with_threads(n),
        None => BatchConfig::from_env(),
    };
    info!(
        files = inputs.len(),
        filter = %filter,
        threads = config.threads,
        "Starting img-filter"
    );

    let coordinator = Arc::new(BatchCoordinator::new(config));
    let (tx, rx) = mpsc::channel();
    coordinator.add_listener(Arc::new(ChannelListener::new(tx)));

    let cancel_target = Arc::clone(&coordinator);
    if let Err(e) = ctrlc::set_handler(move || {
        cancel_target.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl+C handler");
    }

    let pb = progress_bar(filter, cli.json)?;
    let handle = coordinator
        .start(inputs, filter)
        .context("Failed to start batch run")?;

    // The coordinator stays alive inside the Ctrl+C handler, so the channel
    // never disconnects; the Idle transition is the last event of a run.
    for event in rx.iter() {
        match &event {
            BatchEvent::Progress(percent) => pb.set_position(u64::from(*percent)),
            BatchEvent::ItemProcessed(item) => pb.set_message(item.file_name.clone()),
            BatchEvent::Log { tag, .. } => {
                if cli.json || (*tag == LogTag::Info && !cli.verbose) {
                    continue;
                }
                if let Some(line) = event.display_line() {
                    pb.println(line);
                }
            }
            BatchEvent::StateChanged(false) => break,
            BatchEvent::StateChanged(true) => {}
        }
    }

    let summary = handle.join();
    pb.finish_and_clear();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    } else {
        print_summary_report(&summary);
    }

    std::process::exit(exit_code(summary.status));
}
