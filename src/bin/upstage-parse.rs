//! CLI binary for upstage-parse.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig`, uploads the documents and prints the result records.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use upstage_parse::{
    run, write_records, ApiKey, Attachment, Base64Category, BatchConfig, BatchProgressCallback, BatchStats,
    InputItem, Language, OcrMode, OutputFormat, ProgressCallback, Profile,
};

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

/// Terminal progress callback: one bar over items plus a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time of the file currently in flight, keyed by (item, property).
    start_times: Mutex<HashMap<(usize, String), Instant>>,
    /// Highest item index seen so far; the bar advances when it changes.
    last_item: Mutex<Option<usize>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving credentials…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            last_item: Mutex::new(None),
        })
    }

    fn advance_to(&self, item_index: usize) {
        let mut last = self.last_item.lock().unwrap_or_else(|e| e.into_inner());
        if *last != Some(item_index) {
            if last.is_some() {
                self.bar.inc(1);
            }
            *last = Some(item_index);
        }
    }

    fn elapsed(&self, item_index: usize, binary_property: &str) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(item_index, binary_property.to_string()))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} items  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_items as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Uploading");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Uploading attachments of {total_items} items…"))
        ));
    }

    fn on_file_start(&self, item_index: usize, binary_property: &str) {
        self.advance_to(item_index);
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((item_index, binary_property.to_string()), Instant::now());
        self.bar.set_message(format!("item {item_index} · {binary_property}"));
    }

    fn on_file_complete(&self, item_index: usize, binary_property: &str, file_name: &str) {
        let secs = self.elapsed(item_index, binary_property);
        self.bar.println(format!(
            "  {} Item {:>3}  {:<12}  {}  {}",
            green("✓"),
            item_index,
            binary_property,
            file_name,
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_file_error(&self, item_index: usize, binary_property: Option<&str>, error: &str) {
        self.advance_to(item_index);
        let secs = binary_property
            .map(|p| self.elapsed(item_index, p))
            .unwrap_or(0.0);

        // Keep long error bodies to one line.
        let msg = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Item {:>3}  {:<12}  {}  {}",
            red("✗"),
            item_index,
            binary_property.unwrap_or("-"),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.bar.finish_and_clear();
        let failed = stats.failed_files + stats.failed_items;
        if failed == 0 {
            eprintln!(
                "{} {} files uploaded",
                green("✔"),
                bold(&stats.uploaded_files.to_string())
            );
        } else {
            eprintln!(
                "{} {} files uploaded  ({} failed)",
                if stats.uploaded_files == 0 { red("✘") } else { cyan("⚠") },
                bold(&stats.uploaded_files.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse one document (prints JSON records to stdout)
  upstage-parse invoice.pdf

  # Several documents, keep going past failures, write results to a file
  upstage-parse --continue-on-fail a.pdf b.png c.jpg -o results.json

  # Request markdown only, force OCR, Korean documents
  upstage-parse --output-formats markdown --ocr true --language ko scan.png

  # Upload n8n-style items (binary data already base64-encoded)
  upstage-parse --items items.json --binary-property data

  # Legacy console endpoint
  upstage-parse --profile document-parsing contract.pdf

ITEMS FILE FORMAT:
  [
    { "binary": { "data": { "data": "<base64>", "fileName": "a.pdf",
                            "mimeType": "application/pdf" } },
      "options": { "outputFormats": ["markdown"] } }
  ]

ENVIRONMENT VARIABLES:
  UPSTAGE_API_KEY         Upstage API key (required)
  UPSTAGE_ENDPOINT        Override the endpoint URL
  RUST_LOG                tracing filter, e.g. upstage_parse=debug
"#;

/// Upload documents to the Upstage document-parsing API.
#[derive(Parser, Debug)]
#[command(
    name = "upstage-parse",
    version,
    about = "Upload documents to the Upstage document-parsing API",
    long_about = "Upload local documents, or n8n-style items carrying base64 attachments, to the \
Upstage document-parsing API. Each attachment is sent as one multipart request and produces one \
JSON result record.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document files to upload. Each file becomes one item with binary property `data`.
    paths: Vec<PathBuf>,

    /// JSON file with an array of items (or a single item) to upload.
    #[arg(long, env = "UPSTAGE_ITEMS")]
    items: Option<PathBuf>,

    /// Upstage API key.
    #[arg(long, env = "UPSTAGE_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Protocol profile: document-digitization or document-parsing (legacy).
    #[arg(long, env = "UPSTAGE_PROFILE", default_value = "document-digitization")]
    profile: Profile,

    /// Endpoint URL override.
    #[arg(long, env = "UPSTAGE_ENDPOINT")]
    endpoint: Option<String>,

    /// Document language: ko or en.
    #[arg(long, env = "UPSTAGE_LANGUAGE")]
    language: Option<Language>,

    /// Model identifier (default: document-parse).
    #[arg(long, env = "UPSTAGE_MODEL")]
    model: Option<String>,

    /// Comma-separated output formats: text, html, json, markdown.
    #[arg(long, value_delimiter = ',')]
    output_formats: Option<Vec<OutputFormat>>,

    /// Comma-separated categories returned as base64: table. Pass "" for none.
    #[arg(long, value_delimiter = ',')]
    base64_encoding: Option<Vec<String>>,

    /// OCR mode: auto, true or false.
    #[arg(long)]
    ocr: Option<OcrMode>,

    /// Request element coordinates (true/false).
    #[arg(long)]
    coordinates: Option<bool>,

    /// Upload only this binary property of each item.
    #[arg(long, env = "UPSTAGE_BINARY_PROPERTY")]
    binary_property: Option<String>,

    /// Record failures and keep going instead of stopping at the first one.
    #[arg(long, env = "UPSTAGE_CONTINUE_ON_FAIL")]
    continue_on_fail: bool,

    /// Write the JSON records to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Collect items ────────────────────────────────────────────────────
    let items = collect_items(&cli).await?;
    if items.is_empty() {
        anyhow::bail!("Nothing to upload: pass document paths or --items");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let api_key = ApiKey::new(cli.api_key.clone()).context("Invalid API key")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = run(&items, &config, &api_key).await.context("Upload failed")?;

    if let Some(ref path) = cli.output {
        write_records(&output.records, path)
            .await
            .context("Failed to write results")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} uploaded  {} failed  {}ms  →  {}",
                if output.stats.failed_files + output.stats.failed_items == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                output.stats.uploaded_files,
                output.stats.failed_files + output.stats.failed_items,
                output.stats.duration_ms,
                bold(&path.display().to_string()),
            );
        }
    } else {
        let json = serde_json::to_string_pretty(&output.records).context("Failed to serialise records")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{json}").context("Failed to write to stdout")?;

        if !cli.quiet && !show_progress {
            eprintln!(
                "Uploaded {} files in {}ms",
                output.stats.uploaded_files, output.stats.duration_ms
            );
            if output.stats.failed_files + output.stats.failed_items > 0 {
                eprintln!(
                    "  {} failed",
                    dim(&(output.stats.failed_files + output.stats.failed_items).to_string())
                );
            }
        }
    }

    Ok(())
}

/// Items from `--items` first, then one item per positional path.
async fn collect_items(cli: &Cli) -> Result<Vec<InputItem>> {
    let mut items = match cli.items {
        Some(ref path) => upstage_parse::load_items(path)
            .await
            .with_context(|| format!("Failed to load items from {}", path.display()))?,
        None => Vec::new(),
    };
    for path in &cli.paths {
        let attachment = Attachment::from_file(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        items.push(InputItem::new().with_attachment("data", attachment));
    }
    Ok(items)
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .profile(cli.profile)
        .continue_on_failure(cli.continue_on_fail);

    if let Some(ref url) = cli.endpoint {
        builder = builder.endpoint(url.clone());
    }
    if let Some(language) = cli.language {
        builder = builder.language(language);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref formats) = cli.output_formats {
        builder = builder.output_formats(formats.clone());
    }
    if let Some(ref categories) = cli.base64_encoding {
        let parsed = categories
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| c.parse::<Base64Category>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid --base64-encoding")?;
        builder = builder.base64_encoding(parsed);
    }
    if let Some(ocr) = cli.ocr {
        builder = builder.ocr(ocr);
    }
    if let Some(coordinates) = cli.coordinates {
        builder = builder.coordinates(coordinates);
    }
    if let Some(ref property) = cli.binary_property {
        builder = builder.binary_property(property.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
