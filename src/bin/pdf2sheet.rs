//! CLI binary for pdf2sheet.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, drives one extraction (through the session cache when
//! `--session` is given) and writes the spreadsheet.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2sheet::config::DEFAULT_OUTPUT_FILE;
use pdf2sheet::export::{render_with_preview, save_bytes, Metrics};
use pdf2sheet::pipeline::input::resolve_input;
use pdf2sheet::{
    inspect, CancellationToken, ExtractionConfig, ExtractionProgressCallback, ExtractionResult,
    Extractor, FileStore, PageSelection, ProgressCallback, ResultCache,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live "page N of M" bar plus one log line
/// per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-page wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose bar length is set by `on_extraction_start`.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
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
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&page_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting records from {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num} of {total}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, record_count: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{record_count:>4} records")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, record_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} records from {} pages",
                green("✔"),
                bold(&record_count.to_string()),
                total_pages
            );
        } else {
            eprintln!(
                "{} {} records from {} pages  ({} pages failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&record_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract and write Relatorio_Processado.xlsx
  pdf2sheet relatorio.pdf

  # Choose the output file
  pdf2sheet relatorio.pdf -o marco.xlsx

  # Only some pages, with the time and document-type columns
  pdf2sheet --pages 3-15 --extended relatorio.pdf

  # Keep results between runs; a second run on the same file is instant
  pdf2sheet --session .pdf2sheet-session.json relatorio.pdf

  # Download the report first
  pdf2sheet https://example.org/relatorio.pdf

  # Page count only (no API key needed)
  pdf2sheet --inspect-only relatorio.pdf

  # Records and metrics as JSON
  pdf2sheet --json relatorio.pdf > records.json

PROVIDERS:
  Provider     Default model                Credential
  ─────────    ──────────────────────────   ──────────────────────────────
  gemini       gemini-2.5-flash             GEMINI_API_KEY or GOOGLE_API_KEY
  openai       gpt-4.1-mini                 OPENAI_API_KEY
  anthropic    claude-sonnet-4-20250514     ANTHROPIC_API_KEY
  mistral      pixtral-large-latest         MISTRAL_API_KEY
  ollama       (pass --model)               none

RATE LIMIT:
  Calls are spaced at least --min-interval-ms apart (default 4000, i.e. at
  most 15 calls per minute). A 30-page report takes about two minutes.
"#;

/// Extract shipping records from PDF reports into a spreadsheet.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2sheet",
    version,
    about = "Extract shipping records from PDF reports into a spreadsheet",
    long_about = "Send each page of a PDF report to a vision model, collect the tracking codes, \
process numbers, dates and destinations it lists, and write them to an .xlsx file.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Spreadsheet to write.
    #[arg(short, long, env = "PDF2SHEET_OUTPUT", default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// LLM provider: gemini, openai, anthropic, mistral, ollama.
    #[arg(long, env = "PDF2SHEET_PROVIDER", default_value = "gemini")]
    provider: String,

    /// LLM model ID. Default depends on the provider.
    #[arg(long, env = "PDF2SHEET_MODEL")]
    model: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2SHEET_PAGES", default_value = "all")]
    pages: String,

    /// Calls per page before giving up on it.
    #[arg(long, env = "PDF2SHEET_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Pause after a failed attempt, in milliseconds.
    #[arg(long, env = "PDF2SHEET_RETRY_DELAY_MS", default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Pause after a quota error, in milliseconds.
    #[arg(long, env = "PDF2SHEET_QUOTA_DELAY_MS", default_value_t = 5000)]
    quota_delay_ms: u64,

    /// Minimum spacing between two service calls, in milliseconds.
    #[arg(long, env = "PDF2SHEET_MIN_INTERVAL_MS", default_value_t = 4000)]
    min_interval_ms: u64,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDF2SHEET_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Also extract hora_envio and documento_tipo.
    #[arg(long, env = "PDF2SHEET_EXTENDED")]
    extended: bool,

    /// Path to a text file holding a custom extraction instruction.
    #[arg(long, env = "PDF2SHEET_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// JSON file that caches the last result between runs.
    #[arg(long, env = "PDF2SHEET_SESSION")]
    session: Option<PathBuf>,

    /// Rows shown in the preview table.
    #[arg(long, env = "PDF2SHEET_PREVIEW_ROWS", default_value_t = 20)]
    preview_rows: usize,

    /// Print metrics and records as JSON instead of the preview table.
    #[arg(long, env = "PDF2SHEET_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2SHEET_NO_PROGRESS")]
    no_progress: bool,

    /// Print name, size and page count only; no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2SHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2SHEET_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2SHEET_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters; library INFO
    // lines would only interleave with it.
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
            );
        } else {
            println!("File:   {}", info.name);
            println!("Size:   {} bytes", info.size);
            println!("Pages:  {}", info.page_count);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted: stopping after the current page…");
                cancel.cancel();
            }
        });
    }

    let config = build_config(&cli, progress_cb, cancel).await?;

    // The credential is checked here, before the document is even read.
    let extractor = Extractor::new(config).context("Cannot start extraction")?;

    // ── Run extraction ───────────────────────────────────────────────────
    let document = resolve_input(&cli.input, cli.download_timeout)
        .await
        .context("Failed to read input")?;

    let result = match cli.session {
        Some(ref path) => {
            let store = FileStore::open(path)
                .with_context(|| format!("Failed to open session file {}", path.display()))?;
            ResultCache::new(store)
                .get_or_extract(&document, &extractor)
                .await
        }
        None => extractor.run_document(&document).await,
    }
    .context("Extraction failed")?;

    // ── Present and export ───────────────────────────────────────────────
    let rendered =
        render_with_preview(&result, cli.preview_rows).context("Failed to build spreadsheet")?;
    save_bytes(&rendered.spreadsheet_bytes, &cli.output)
        .context("Failed to write spreadsheet")?;

    if cli.json {
        let payload = serde_json::json!({
            "metrics": rendered.metrics,
            "output": cli.output,
            "result": result,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        print_summary(&rendered.metrics, &result, &cli.output);
        println!();
        print!("{}", rendered.table_view);
    }

    Ok(())
}

fn print_summary(metrics: &Metrics, result: &ExtractionResult, output: &std::path::Path) {
    eprintln!(
        "{}  {} records  ·  {} pages  ·  {} failed  →  {}",
        if metrics.failed_pages == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        bold(&metrics.record_count.to_string()),
        metrics.page_count,
        metrics.failed_pages,
        bold(&output.display().to_string()),
    );
    if metrics.malformed_records > 0 {
        eprintln!(
            "   {} records have a code that doesn't match its pattern",
            cyan(&metrics.malformed_records.to_string())
        );
    }
    for page in result.failed_pages() {
        if let Some(ref e) = page.error {
            eprintln!("   {} {}", red("✗"), dim(&e.to_string()));
        }
    }
    eprintln!(
        "   {} calls  ·  {} tokens in  /  {} tokens out  ·  {}ms",
        result.stats.total_calls,
        dim(&result.stats.total_input_tokens.to_string()),
        dim(&result.stats.total_output_tokens.to_string()),
        result.stats.total_duration_ms,
    );
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
) -> Result<ExtractionConfig> {
    let pages = parse_pages(&cli.pages)?;

    let mut builder = ExtractionConfig::builder()
        .provider_name(cli.provider.trim().to_lowercase())
        .pages(pages)
        .max_attempts(cli.max_attempts)
        .retry_delay(Duration::from_millis(cli.retry_delay_ms))
        .quota_delay(Duration::from_millis(cli.quota_delay_ms))
        .min_call_interval(Duration::from_millis(cli.min_interval_ms))
        .max_tokens(cli.max_tokens)
        .extended_fields(cli.extended)
        .download_timeout_secs(cli.download_timeout)
        .cancellation(cancel);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref path) = cli.instruction {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(text);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
