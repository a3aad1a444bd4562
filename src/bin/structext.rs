//! CLI binary for structext.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use structext::{
    dump_file_pages, encode_file, extract_file, extract_to_file, ExtractionConfig,
    ExtractionOutput, ExtractionProgressCallback, FailurePolicy, ProgressCallback,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

/// Terminal progress callback: a live bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the page currently in flight (pages run one at a time).
    page_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Loading");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
    }

    fn elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        *self.page_started.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs();
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

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} page(s) extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} page(s) extracted  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a scanned table (stdout)
  structext receipt.png

  # Extract every page of a PDF into a file
  structext report.pdf -o report.txt

  # Show the full model response and token usage per page
  structext --show-response invoice.jpg

  # Stop at the first failed page instead of skipping it
  structext --on-error abort report.pdf

  # Print the data URIs that would be sent (no API key needed)
  structext --encode-only scan.gif

  # Write page_1.png, page_2.png, … at 300 DPI (no API key needed)
  structext --dump-pages ./pages report.pdf

  # Any OpenAI-compatible endpoint
  structext --base-url http://localhost:11434/v1 --model llava scan.png

ACCEPTED INPUT:
  png, jpg, jpeg, bmp, gif, pdf (matched on the file extension)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          API key for the chat completions endpoint
  OPENAI_BASE_URL         Endpoint base URL (default https://api.openai.com/v1)
  STRUCTEXT_MODEL         Model ID (default gpt-4o-mini)
  PDFIUM_LIB_PATH         pdfium shared library file or directory
  RUST_LOG                Overrides the log filter
"#;

/// Extract structured text from images and PDFs using a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "structext",
    version,
    about = "Extract structured text from images and PDFs using a vision model",
    long_about = "Send each page of an image or PDF to an OpenAI-compatible chat completions \
endpoint and print the extracted text, keeping tables and other layouts intact. PDF pages are \
prefixed with \"Page i of N:\" headers.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image or PDF file.
    input: PathBuf,

    /// Write the extracted text to this file instead of stdout.
    #[arg(short, long, env = "STRUCTEXT_OUTPUT")]
    output: Option<PathBuf>,

    /// Model ID.
    #[arg(long, env = "STRUCTEXT_MODEL", default_value = structext::config::DEFAULT_MODEL)]
    model: String,

    /// API key for the chat completions endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = structext::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// PDF rendering DPI (72–600).
    #[arg(long, env = "STRUCTEXT_DPI", default_value_t = structext::config::DEFAULT_DPI,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Text file replacing the default extraction instruction.
    #[arg(long, env = "STRUCTEXT_INSTRUCTION_FILE")]
    instruction_file: Option<PathBuf>,

    /// What to do when a page fails.
    #[arg(long, env = "STRUCTEXT_ON_ERROR", value_enum, default_value = "continue")]
    on_error: OnErrorArg,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "STRUCTEXT_PDF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print the data URI of each page and exit without calling the model.
    #[arg(long, conflicts_with_all = ["dump_pages", "output", "json"])]
    encode_only: bool,

    /// Write each page as page_{i}.png into DIR and exit.
    #[arg(long, value_name = "DIR", conflicts_with_all = ["output", "json"])]
    dump_pages: Option<PathBuf>,

    /// Print the full model response and token usage for every page.
    #[arg(long, env = "STRUCTEXT_SHOW_RESPONSE")]
    show_response: bool,

    /// Output structured JSON (ExtractionOutput) instead of plain text.
    #[arg(long, env = "STRUCTEXT_JSON")]
    json: bool,

    /// pdfium shared library file or directory.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "STRUCTEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "STRUCTEXT_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "STRUCTEXT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OnErrorArg {
    Continue,
    Abort,
}

impl From<OnErrorArg> for FailurePolicy {
    fn from(v: OnErrorArg) -> Self {
        match v {
            OnErrorArg::Continue => FailurePolicy::Continue,
            OnErrorArg::Abort => FailurePolicy::Abort,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let extracting = !cli.encode_only && cli.dump_pages.is_none();
    let show_progress = extracting && !cli.quiet && !cli.no_progress && !cli.json;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Encode-only / dump modes ─────────────────────────────────────────
    if !extracting {
        if let Some(ref dir) = cli.dump_pages {
            let written = dump_file_pages(&cli.input, dir, &config)
                .await
                .context("Failed to write page images")?;
            if !cli.quiet {
                for path in &written {
                    eprintln!("  {} {}", green("✓"), path.display());
                }
            }
        } else {
            let pages = encode_file(&cli.input, &config)
                .await
                .context("Failed to encode input")?;
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            for page in &pages {
                writeln!(handle, "{}", page.data_uri()).context("Failed to write to stdout")?;
            }
        }
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let output = extract_to_file(&cli.input, output_path, &config)
            .await
            .context("Extraction failed")?;

        if cli.show_response {
            print_responses(&output);
        }

        let stats = &output.stats;
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} pages  {}ms  →  {}",
                if stats.failed_pages == 0 { green("✔") } else { cyan("⚠") },
                stats.succeeded_pages,
                stats.total_pages,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {} prompt tokens  /  {} completion tokens",
                dim(&stats.total_prompt_tokens.to_string()),
                dim(&stats.total_completion_tokens.to_string()),
            );
        }
        return Ok(());
    }

    let output = extract_file(&cli.input, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.text.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if cli.show_response {
        print_responses(&output);
    }

    if !cli.quiet && !show_progress {
        eprintln!(
            "Extracted {}/{} pages in {}ms",
            output.stats.succeeded_pages, output.stats.total_pages, output.stats.total_duration_ms
        );
        if output.stats.failed_pages > 0 {
            eprintln!("  {} pages failed", output.stats.failed_pages);
        }
    } else if !cli.quiet {
        eprintln!(
            "   {} prompt tokens  /  {} completion tokens  /  {}ms total",
            dim(&output.stats.total_prompt_tokens.to_string()),
            dim(&output.stats.total_completion_tokens.to_string()),
            output.stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .model(cli.model.clone())
        .base_url(cli.base_url.clone())
        .failure_policy(cli.on_error.into());

    if let Some(ref path) = cli.instruction_file {
        let instruction = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(instruction.trim_end().to_string());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.pdf_password(pwd.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Dump every page's full response and token usage to stderr.
fn print_responses(output: &ExtractionOutput) {
    for page in &output.pages {
        eprintln!(
            "{}",
            bold(&format!("── Page {} of {} ──", page.page_num, page.total_pages))
        );
        match (&page.error, page.raw_pretty()) {
            (Some(err), _) => eprintln!("{}", red(&err.to_string())),
            (None, Some(raw)) => eprintln!("{raw}"),
            (None, None) => eprintln!("{}", dim("(no response)")),
        }
        if let Some(usage) = page.usage {
            eprintln!(
                "{}",
                dim(&format!(
                    "tokens: prompt {}  completion {}  total {}",
                    usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                ))
            );
        }
    }
}
