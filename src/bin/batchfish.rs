//! CLI binary for batchfish.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig` and prints the throughput report.

use anyhow::{Context, Result};
use batchfish::{
    run_batch, BatchConfig, BatchProgressCallback, CancellationToken, ItemError, ItemStats,
    PipelineResult, PipelineState, ProgressCallback, DEFAULT_ENDPOINT,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner with dispatched/completed counters plus one
/// log line per finished file. The total is unknown while the walk is still
/// running, so there is no bar length.
struct CliProgressCallback {
    spinner: ProgressBar,
    dispatched: AtomicUsize,
    completed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        spinner.set_style(style);
        spinner.set_prefix("Starting");
        spinner.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            spinner,
            dispatched: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }

    fn refresh(&self) {
        self.spinner.set_message(format!(
            "{} done / {} dispatched",
            self.completed.load(Ordering::SeqCst),
            self.dispatched.load(Ordering::SeqCst)
        ));
    }

    fn finish(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.refresh();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_state_change(&self, state: PipelineState) {
        let prefix = match state {
            PipelineState::Idle => "Starting",
            PipelineState::Running => "Submitting",
            PipelineState::Draining => "Draining",
            PipelineState::Finalized => "Done",
        };
        self.spinner.set_prefix(prefix);
    }

    fn on_item_start(&self, _path: &Path, dispatched: usize) {
        self.dispatched.store(dispatched, Ordering::SeqCst);
        self.refresh();
    }

    fn on_item_complete(&self, path: &Path, stats: &ItemStats, elapsed: Duration) {
        let pages = match stats.pages {
            Some(n) => format!("{n:>4} pages"),
            None => "   - pages".to_string(),
        };
        self.spinner.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            path.display(),
            dim(&pages),
            dim(&format!("{:.1}s", elapsed.as_secs_f64())),
        ));
        self.finish();
    }

    fn on_item_error(&self, path: &Path, error: &ItemError) {
        let error = error.to_string();
        // Keep long server messages on one line.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error
        };
        self.spinner.println(format!(
            "  {} {}  {}",
            red("✗"),
            path.display(),
            red(&msg)
        ));
        self.finish();
    }

    fn on_batch_complete(&self, attempted: usize, succeeded: usize) {
        self.spinner.finish_and_clear();
        let failed = attempted.saturating_sub(succeeded);
        if failed == 0 {
            eprintln!(
                "{} {} files processed successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files processed  ({} failed)",
                if failed == attempted {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                attempted,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Defaults: in/ -> out/, query.json, 10 concurrent requests
  batchfish

  # Local entity-fishing instance, pretty JSON, 4 requests at a time
  batchfish -s http://localhost:8090/service/disambiguate -c 4 -p

  # Skip files directly inside in/done
  batchfish --in in/ --skip-dir done

  # Machine-readable summary, non-zero exit if any file failed
  batchfish --json --strict > summary.json

ENVIRONMENT VARIABLES:
  BATCHFISH_SERVER        Endpoint URL
  BATCHFISH_IN            Input root directory
  BATCHFISH_OUT           Output directory
  BATCHFISH_QUERY         Query payload file
  BATCHFISH_MAXNB         Maximum concurrent requests
  PDFIUM_LIB_PATH         Directory containing libpdfium (page counting)
  RUST_LOG                Overrides the log filter

NOTES:
  Individual file failures are reported but do not change the exit code
  unless --strict is given. Ctrl-C stops discovery; requests already in
  flight are allowed to finish before the report is printed.
"#;

/// Submit a tree of documents to an entity-fishing style service.
#[derive(Parser, Debug)]
#[command(
    name = "batchfish",
    version,
    about = "Batch-submit documents to a remote processing service and save the JSON responses",
    long_about = "Walks the input directory, POSTs every file together with a fixed query \
payload as multipart/form-data, and writes one JSON artifact per file to the output \
directory. At most --maxnb requests are in flight at any time.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// The server address.
    #[arg(short = 's', long = "server", env = "BATCHFISH_SERVER", default_value = DEFAULT_ENDPOINT)]
    server: String,

    /// The location of the input files.
    #[arg(long = "in", env = "BATCHFISH_IN", default_value = "in/")]
    input: PathBuf,

    /// The location where the JSON files will be saved.
    #[arg(long = "out", env = "BATCHFISH_OUT", default_value = "out/")]
    output: PathBuf,

    /// The query payload file.
    #[arg(short = 'q', long = "query", env = "BATCHFISH_QUERY", default_value = "query.json")]
    query: PathBuf,

    /// Maximum number of concurrent requests.
    #[arg(short = 'c', long = "maxnb", env = "BATCHFISH_MAXNB", default_value_t = 10,
          value_parser = clap::value_parser!(u32).range(1..))]
    maxnb: u32,

    /// Format the JSON documents.
    #[arg(short = 'p', long = "pretty", env = "BATCHFISH_PRETTY")]
    pretty: bool,

    /// Skip files located directly inside this directory (relative to --in).
    #[arg(long, env = "BATCHFISH_SKIP_DIR")]
    skip_dir: Option<PathBuf>,

    /// Per-request timeout in seconds (0 disables it).
    #[arg(long, env = "BATCHFISH_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Extension of the written artifacts.
    #[arg(long, env = "BATCHFISH_EXTENSION", default_value = "json")]
    extension: String,

    /// Do not count PDF pages (disables the pages/s report).
    #[arg(long, env = "BATCHFISH_NO_PAGES")]
    no_pages: bool,

    /// Exit non-zero when any file fails.
    #[arg(long, env = "BATCHFISH_STRICT")]
    strict: bool,

    /// Print the batch summary as JSON on stdout.
    #[arg(long, env = "BATCHFISH_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "BATCHFISH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BATCHFISH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(long, env = "BATCHFISH_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports every file; keep INFO logs out of its way.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Ctrl-C stops dispatch; in-flight requests drain ──────────────────
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} interrupted, waiting for in-flight requests…", cyan("◆"));
            on_signal.cancel();
        }
    });

    // ── Run batch ────────────────────────────────────────────────────────
    let result = run_batch(&config, cancel)
        .await
        .context("Batch could not start")?;

    if cli.json {
        let summary = serde_json::to_string_pretty(&result.summary())
            .context("Failed to serialise summary")?;
        println!("{summary}");
    } else if !cli.quiet {
        print_report(&result, !show_progress);
    }

    if let Some(ref fatal) = result.fatal {
        let phase = fatal
            .phase()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "setup".to_string());
        anyhow::bail!("Batch aborted during {phase}: {fatal}");
    }
    if cli.strict && result.failed() > 0 {
        anyhow::bail!(
            "{} of {} files failed (--strict)",
            result.failed(),
            result.attempted
        );
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .endpoint(cli.server.clone())
        .input_root(cli.input.clone())
        .output_dir(cli.output.clone())
        .query_path(cli.query.clone())
        .max_concurrent(cli.maxnb as usize)
        .pretty_print(cli.pretty)
        .output_extension(cli.extension.clone())
        .request_timeout_secs(cli.timeout)
        .count_pages(!cli.no_pages);

    if let Some(ref skip) = cli.skip_dir {
        builder = builder.skip_dir(skip.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Human-readable throughput report on stderr.
fn print_report(result: &PipelineResult, list_failures: bool) {
    if list_failures && !result.failures.is_empty() {
        eprintln!("{}", bold("Failed files:"));
        for failure in &result.failures {
            eprintln!("  {} {}  {}", red("✗"), failure.path.display(), failure.error);
        }
    }

    eprintln!(
        "{} of {} files succeeded",
        bold(&result.succeeded.to_string()),
        result.attempted
    );
    eprintln!("{} Pages were processed in:", bold(&result.total_pages.to_string()));
    eprintln!("  {:?} (User time)", result.wall_time);
    eprintln!("  {:?} (System time)", result.processing_time);
    eprintln!("This amounts to:");
    eprintln!("  {:.2} pages/s (User time)", result.pages_per_wall_second());
    eprintln!("  {:.2} pages/s (System time)", result.pages_per_processing_second());
}
