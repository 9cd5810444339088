//! CLI binary for tabreview.
//!
//! A thin shim over the library crate: maps CLI flags to `ReviewConfig`,
//! runs the review and prints one JSON result line on stdout. Everything
//! else (logs, progress) goes to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tabreview::{
    review_file, review_file_with_store, CancelToken, DirectoryProfileStore, ModelCatalog,
    ProgressCallback, ProviderKind, ReviewConfig, ReviewError, ReviewOutput,
    ReviewProgressCallback, RunResult, ToleranceProfile,
};
use tracing::warn;
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

/// Progress bar plus one stderr line per chunk. Chunks finish out of order
/// when reviewed concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_review_start` tells us the chunk count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting report…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Reviewing");
        self.bar.reset_eta();
    }

    fn elapsed_ms(&self, chunk: usize) -> u128 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&chunk))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ReviewProgressCallback for CliProgressCallback {
    fn on_review_start(&self, total_chunks: usize) {
        self.activate_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reviewing {total_chunks} chunks…"))
        ));
    }

    fn on_chunk_start(&self, chunk: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(chunk, Instant::now());
        }
        self.bar.set_message(format!("chunk {chunk}"));
    }

    fn on_chunk_complete(&self, chunk: usize, total: usize, findings: usize) {
        let elapsed_ms = self.elapsed_ms(chunk);
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            chunk,
            total,
            dim(&format!("{findings:>3} findings")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, chunk: usize, total: usize, error: &str) {
        let elapsed_ms = self.elapsed_ms(chunk);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            chunk,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_review_complete(&self, total_chunks: usize, reviewed: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();
        eprintln!("{}", chunk_summary(total_chunks, reviewed, failed));
    }
}

/// One-line chunk tally; chunks neither reviewed nor failed were never
/// started (cancelled).
fn chunk_summary(total_chunks: usize, reviewed: usize, failed: usize) -> String {
    if reviewed == total_chunks {
        return format!("{} {} chunks reviewed", green("✔"), bold(&reviewed.to_string()));
    }
    let not_started = total_chunks.saturating_sub(reviewed + failed);
    format!(
        "{} {}/{} chunks reviewed  ({} failed, {} not started)",
        if reviewed == 0 { red("✘") } else { cyan("⚠") },
        bold(&reviewed.to_string()),
        total_chunks,
        red(&failed.to_string()),
        not_started,
    )
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Review a PDF report with the built-in "Manager Default" tolerances
  tabreview report.pdf "$OPENAI_API_KEY" gpt-4o

  # Key and model from the environment
  TABREVIEW_API_KEY=sk-... tabreview report.pdf

  # Spreadsheet input with a job-specific profile file
  tabreview --profile tolerances/job-1142.json readings.xlsx

  # Profile from a directory store, fetched by id
  tabreview --profile-dir ~/.tabreview/profiles --profile-id hospital-wing report.pdf

  # Claude, fewer concurrent calls, no annotated copy
  tabreview --concurrency 2 --no-annotate report.pdf sk-ant-... claude-3-opus-20240229

  # Local model through edgequake-llm
  tabreview --provider ollama report.pdf "" llama3.1

  # Known models and context windows
  tabreview --list-models

OUTPUT:
  stdout  one JSON line: {"status":"success","findings":[{"page":2,"issue":"..."}],...}
  stderr  progress and logs
  file    <stem>_review.pdf next to a PDF input, with a highlight and a note per match

  Exit code 0 when the pipeline completed (even with skipped chunks), 1 otherwise.

ENVIRONMENT VARIABLES:
  TABREVIEW_API_KEY       Provider credential (positional API_KEY)
  TABREVIEW_MODEL         Model id (positional MODEL)
  OPENAI_API_KEY          Fallback key for OpenAI models
  ANTHROPIC_API_KEY       Fallback key for Claude models
  GEMINI_API_KEY          Fallback key for Gemini models
  XAI_API_KEY             Fallback key for Grok models
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Overrides the log filter
"#;

/// Review TAB reports against tolerance profiles with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "tabreview",
    version,
    about = "Review TAB reports against tolerance profiles with an LLM",
    long_about = "Extracts the text and tables of a Test-and-Balance report (PDF or spreadsheet), \
asks a language model to flag readings outside the tolerance profile, prints the findings as JSON \
and writes an annotated copy of PDF inputs.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Report file (.pdf, .xlsx, .xlsm, .xls, .ods).
    #[arg(required_unless_present = "list_models")]
    file: Option<PathBuf>,

    /// Provider credential. Falls back to the provider's own env var.
    #[arg(env = "TABREVIEW_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model id (e.g. gpt-4o, claude-3-opus-20240229, gemini-1.5-pro-latest).
    #[arg(env = "TABREVIEW_MODEL", default_value = "gpt-4o")]
    model: String,

    /// Provider: openai, anthropic, gemini, xai, or any edgequake-llm provider name.
    #[arg(
        long,
        env = "TABREVIEW_PROVIDER",
        long_help = "Provider override. Inferred from the model name if not set.\n\
          openai, anthropic, gemini and xai are called directly; any other name \
          (ollama, azure, mistral, …) goes through edgequake-llm."
    )]
    provider: Option<String>,

    /// Tolerance profile JSON file.
    #[arg(long, env = "TABREVIEW_PROFILE", conflicts_with = "profile_id")]
    profile: Option<PathBuf>,

    /// Directory of `<id>.json` profiles.
    #[arg(long, env = "TABREVIEW_PROFILE_DIR", requires = "profile_id")]
    profile_dir: Option<PathBuf>,

    /// Profile id inside --profile-dir.
    #[arg(long, env = "TABREVIEW_PROFILE_ID", requires = "profile_dir")]
    profile_id: Option<String>,

    /// Number of concurrent provider calls.
    #[arg(short, long, env = "TABREVIEW_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Share of the context window used for report content, in (0, 1].
    #[arg(long, env = "TABREVIEW_CHUNK_RATIO", default_value_t = 0.85)]
    chunk_ratio: f64,

    /// Retries per chunk on transient failures.
    #[arg(long, env = "TABREVIEW_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call timeout in seconds.
    #[arg(long, env = "TABREVIEW_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Base URL override for the provider API.
    #[arg(long, env = "TABREVIEW_ENDPOINT")]
    endpoint: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "TABREVIEW_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max response tokens per call.
    #[arg(long, env = "TABREVIEW_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "TABREVIEW_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Do not write `<stem>_review.pdf`.
    #[arg(long, env = "TABREVIEW_NO_ANNOTATE")]
    no_annotate: bool,

    /// Disable progress bar.
    #[arg(long, env = "TABREVIEW_NO_PROGRESS")]
    no_progress: bool,

    /// Print the model catalog and exit.
    #[arg(long)]
    list_models: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TABREVIEW_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TABREVIEW_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar replaces INFO lines; warnings about skipped chunks still show.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.list_models;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Catalog listing ──────────────────────────────────────────────────
    if cli.list_models {
        print_models(&ModelCatalog::default());
        return Ok(ExitCode::SUCCESS);
    }

    // ── Ctrl-C → cancel between chunks ───────────────────────────────────
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing in-flight chunks");
                cancel.cancel();
            }
        });
    }

    let progress = if show_progress {
        Some(CliProgressCallback::new_dynamic())
    } else {
        None
    };

    let outcome = run(&cli, cancel, progress.clone()).await;
    if let Some(ref p) = progress {
        p.finish();
    }

    if !cli.quiet {
        print_summary(&outcome);
    }

    let result = RunResult::from(outcome);
    result
        .emit(io::stdout().lock())
        .context("Failed to write result to stdout")?;

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run(
    cli: &Cli,
    cancel: CancelToken,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<ReviewOutput, ReviewError> {
    let file = cli
        .file
        .as_ref()
        .ok_or_else(|| ReviewError::InvalidConfig("no report file given".into()))?;
    let config = build_config(cli, cancel, progress.map(|p| p as ProgressCallback)).await?;

    match (&cli.profile_dir, &cli.profile_id, &cli.profile) {
        (Some(dir), Some(id), _) => {
            let store = DirectoryProfileStore::new(dir);
            review_file_with_store(file, &store, id, &config).await
        }
        (_, _, Some(path)) => {
            let profile = tabreview::profile::load_profile_file(path)?.profile;
            review_file(file, &profile, &config).await
        }
        _ => review_file(file, &ToleranceProfile::manager_default(), &config).await,
    }
}

/// Map CLI args to `ReviewConfig`.
async fn build_config(
    cli: &Cli,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
) -> Result<ReviewConfig, ReviewError> {
    let mut builder = ReviewConfig::builder()
        .model(cli.model.clone())
        .chunk_ratio(cli.chunk_ratio)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .temperature(cli.temperature)
        .max_output_tokens(cli.max_tokens)
        .annotate(!cli.no_annotate)
        .cancel_token(cancel);

    if let Some(ref key) = cli.api_key {
        if !key.trim().is_empty() {
            builder = builder.api_key(key.clone());
        }
    }
    if let Some(ref name) = cli.provider {
        let kind: ProviderKind = name.parse().unwrap_or_else(|never| match never {});
        builder = builder.provider(kind);
    }
    if let Some(ref url) = cli.endpoint {
        builder = builder.endpoint(url.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path).await.map_err(|e| {
            ReviewError::InvalidConfig(format!(
                "failed to read system prompt from {}: {e}",
                path.display()
            ))
        })?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build()
}

fn print_models(catalog: &ModelCatalog) {
    println!("{:<28} {:<10} {:>12}", "MODEL", "PROVIDER", "CONTEXT");
    for spec in catalog.specs() {
        println!(
            "{:<28} {:<10} {:>12}",
            spec.name,
            spec.provider.name(),
            spec.context_window
        );
    }
}

fn print_summary(outcome: &Result<ReviewOutput, ReviewError>) {
    match outcome {
        Ok(output) => {
            let s = &output.stats;
            eprintln!(
                "{}  {} findings  {}/{} chunks  {}ms",
                if s.chunks_skipped == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                bold(&s.findings.to_string()),
                s.chunks_reviewed,
                s.chunks,
                s.total_ms,
            );
            if let Some(ref path) = output.annotated_file {
                eprintln!(
                    "   {} annotations  →  {}",
                    dim(&s.annotations.to_string()),
                    bold(&path.display().to_string())
                );
            }
            if !output.unplaced_findings.is_empty() {
                eprintln!(
                    "   {}",
                    dim(&format!(
                        "{} findings could not be placed on the PDF",
                        output.unplaced_findings.len()
                    ))
                );
            }
            if let Some(ref e) = output.annotation_error {
                eprintln!("   {} {}", red("annotation failed:"), e);
            }
        }
        Err(e) => eprintln!("{} {}", red("✘"), e),
    }
}
