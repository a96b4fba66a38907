//! CLI binary for edgequake-doclens.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig`, loads the inputs and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doclens::pipeline::input::load_sources;
use edgequake_doclens::{
    AnalysisMode, BatchOrchestrator, BatchOutput, BatchProgressCallback, ConsolidatedOutput,
    DocumentId, DocumentReport, IndividualOutput, PipelineConfig, ProgressCallback, ReportStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback. Documents finish out of order, so start
/// times are keyed by document id.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<DocumentId, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading documents…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, id: &DocumentId) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} documents  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_documents as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, id: &DocumentId, filename: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(id.clone(), Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_document_complete(&self, id: &DocumentId, filename: &str, chars: usize) {
        let secs = self.elapsed_secs(id);
        self.bar.println(format!(
            "  {} {:<32}  {:<12}  {}",
            green("✓"),
            filename,
            dim(&format!("{chars:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, id: &DocumentId, filename: &str, error: &str) {
        let secs = self.elapsed_secs(id);
        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            red("✗"),
            filename,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        let failed = total_documents.saturating_sub(succeeded);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} documents classified",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents classified  ({} failed)",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify and analyse each document
  doclens invoice.pdf ledger.xlsx contract.docx

  # One synthesis across the whole batch
  doclens --mode consolidated q3/*.pdf q3/balance.xlsx

  # JSON output
  doclens --json scan.png > result.json

  # Native extraction only (scans and images will be rejected)
  doclens --no-ocr report.pdf

  # Documents from URLs
  doclens https://example.com/invoice-42.pdf

SUPPORTED FORMATS:
  pdf                 native text layer, OCR fallback when the layer is too thin
  docx, csv, xlsx     native only
  png, jpg, jpeg      OCR only
  bin, dat, tmp, none detected from content

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Extract, classify and analyse business documents with LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "doclens",
    version,
    about = "Extract, classify and analyse business documents with LLMs",
    long_about = "Extract text from PDF, DOCX, CSV, XLSX and image files (native text first, \
vision-model OCR as fallback), classify each document and produce either per-document \
analyses or one consolidated analysis across the batch.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Report per document or one consolidated analysis.
    #[arg(long, env = "DOCLENS_MODE", value_enum, default_value = "individual")]
    mode: ModeArg,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Provider used for OCR. Defaults to --provider.
    #[arg(long, env = "DOCLENS_OCR_PROVIDER")]
    ocr_provider: Option<String>,

    /// Vision model used for OCR. Defaults to --model.
    #[arg(long, env = "DOCLENS_OCR_MODEL")]
    ocr_model: Option<String>,

    /// Pages of one document sent to the OCR model at the same time.
    #[arg(long, env = "DOCLENS_OCR_PAGE_CONCURRENCY", default_value_t = 4)]
    ocr_page_concurrency: usize,

    /// Hint for the OCR model about where the relevant text sits.
    #[arg(long, env = "DOCLENS_OCR_HINT")]
    ocr_hint: Option<String>,

    /// Disable OCR entirely.
    #[arg(long, env = "DOCLENS_NO_OCR")]
    no_ocr: bool,

    /// Skip the per-document analysis in individual mode.
    #[arg(long, env = "DOCLENS_NO_ANALYSIS")]
    no_analysis: bool,

    /// Documents processed concurrently.
    #[arg(short, long, env = "DOCLENS_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Maximum documents per batch.
    #[arg(long, env = "DOCLENS_MAX_FILES", default_value_t = 10)]
    max_files: usize,

    /// Native PDF text must exceed this many non-whitespace characters per page.
    #[arg(long, env = "DOCLENS_MIN_CHARS_PER_PAGE", default_value_t = 40)]
    min_chars_per_page: usize,

    /// Max LLM output tokens per call.
    #[arg(long, env = "DOCLENS_MAX_TOKENS", default_value_t = 3000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCLENS_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries per LLM call on transient failure (at most 10).
    #[arg(long, env = "DOCLENS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-document OCR timeout in seconds.
    #[arg(long, env = "DOCLENS_OCR_TIMEOUT", default_value_t = 180)]
    ocr_timeout: u64,

    /// Overall batch deadline in seconds.
    #[arg(long, env = "DOCLENS_BATCH_TIMEOUT")]
    batch_timeout: Option<u64>,

    /// Per LLM call timeout in seconds.
    #[arg(long, env = "DOCLENS_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCLENS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output structured JSON instead of text.
    #[arg(long, env = "DOCLENS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCLENS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCLENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCLENS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Individual,
    Consolidated,
}

impl From<ModeArg> for AnalysisMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Individual => AnalysisMode::Individual,
            ModeArg::Consolidated => AnalysisMode::Consolidated,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
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

    // ── Build config and orchestrator ────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let sources = load_sources(&cli.inputs, cli.max_files, cli.download_timeout)
        .await
        .context("Failed to load inputs")?;

    let orchestrator = BatchOrchestrator::from_env(config)
        .await
        .context("Failed to configure LLM provider")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = orchestrator
        .run(cli.mode.into(), sources)
        .await
        .context("Batch failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    match output {
        BatchOutput::Individual(out) => print_individual(&out),
        BatchOutput::Consolidated(out) => print_consolidated(&out),
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .max_batch_size(cli.max_files)
        .min_chars_per_page(cli.min_chars_per_page)
        .analyze_documents(!cli.no_analysis)
        .ocr_enabled(!cli.no_ocr)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .ocr_timeout_secs(cli.ocr_timeout)
        .ocr_page_concurrency(cli.ocr_page_concurrency)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref p) = cli.ocr_provider {
        builder = builder.ocr_provider_name(p.clone());
    }
    if let Some(ref m) = cli.ocr_model {
        builder = builder.ocr_model(m.clone());
    }
    if let Some(ref h) = cli.ocr_hint {
        builder = builder.ocr_region_hint(h.clone());
    }
    if let Some(secs) = cli.batch_timeout {
        builder = builder.batch_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

// ── Text output ──────────────────────────────────────────────────────────

fn print_report(r: &DocumentReport) {
    let mark = match r.status {
        ReportStatus::Success => green("✓"),
        ReportStatus::Failed => red("✗"),
    };
    println!("{} {}  {}", mark, bold(&r.filename), dim(r.id.as_str()));
    match (&r.document_type, &r.extraction_method, &r.error) {
        (Some(t), Some(m), _) => println!("  type: {t}   extracted via: {m}"),
        (_, _, Some(e)) => println!("  {}", red(&e.to_string())),
        _ => {}
    }
    if let Some(ref a) = r.analysis {
        if !a.language.is_empty() {
            println!("  language: {}", a.language);
        }
        println!("\n  {}\n", a.summary);
        for (i, rec) in a.recommendations.iter().enumerate() {
            println!("  {}. {}", i + 1, rec);
        }
    }
    if let Some(ref e) = r.analysis_error {
        println!("  {}", dim(&format!("analysis unavailable: {e}")));
    }
    println!();
}

fn print_individual(out: &IndividualOutput) {
    for r in &out.results {
        print_report(r);
    }
    eprintln!(
        "{}/{} documents succeeded in {}ms",
        out.succeeded, out.total_documents, out.duration_ms
    );
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}", bold(title));
    for (i, item) in items.iter().enumerate() {
        println!("  {}. {}", i + 1, item);
    }
    println!();
}

fn print_consolidated(out: &ConsolidatedOutput) {
    let a = &out.analysis;
    println!("{}\n", bold("Summary"));
    println!("{}\n", a.summary);
    print_list("Key findings", &a.key_findings);
    print_list("Recommendations", &a.recommendations);
    print_list("Priority actions", &a.priority_actions);

    println!("{}", bold("Documents"));
    for d in &a.included_documents {
        println!(
            "  {} {}  {} ({}, {})",
            green("✓"),
            d.filename,
            dim(d.id.as_str()),
            d.document_type,
            d.extraction_method
        );
    }
    for d in &a.excluded_documents {
        println!(
            "  {} {}  {}  {}",
            red("✗"),
            d.filename,
            dim(d.id.as_str()),
            red(&d.reason)
        );
    }
    eprintln!(
        "{}/{} documents included in {}ms",
        out.succeeded, out.total_documents, out.duration_ms
    );
}
